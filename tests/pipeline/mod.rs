mod fetch;
mod message_sync;
mod runner;
