use crate::records::NaturalKey;
use std::collections::HashMap;

/// Collapses `records` on their natural key.
///
/// Records without a complete key are dropped. For each key the last
/// occurrence wins, and keys keep the order in which they were first seen.
pub fn last_wins<T>(records: &[T]) -> Vec<T>
where
    T: NaturalKey + Clone,
{
    let mut slots: HashMap<T::Key, usize> = HashMap::with_capacity(records.len());
    let mut out: Vec<T> = Vec::with_capacity(records.len());

    for record in records {
        let Some(key) = record.natural_key() else {
            continue;
        };
        match slots.get(&key) {
            Some(&slot) => out[slot] = record.clone(),
            None => {
                slots.insert(key, out.len());
                out.push(record.clone());
            }
        }
    }

    out
}
