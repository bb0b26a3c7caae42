pub mod epoch;
pub mod gate;
pub mod retry;
pub mod executor;
pub mod pipeline;
pub mod history;
pub mod alerts;
pub mod report;
pub mod validator;
pub mod miner;
pub mod metrics;
pub mod utils;
