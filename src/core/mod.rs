pub mod content;
pub mod conversation;
pub mod gateway;
pub mod notify;
pub mod poller;
pub mod store;
pub mod terminal;
pub mod types;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;
