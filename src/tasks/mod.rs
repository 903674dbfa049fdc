pub mod broadcast;
pub mod discovery;
pub mod poller;
pub mod registry;
pub mod responder;
pub mod switch;
