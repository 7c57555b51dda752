//! Quote responder: answers the latest transport request in a mailbox with
//! a priced, LLM-written reply based on the driving distance.

pub mod channels;
pub mod config;
pub mod error;
pub mod geo;
pub mod llm;
pub mod pipeline;
pub mod retry;
