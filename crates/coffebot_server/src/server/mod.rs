#![forbid(unsafe_code)]

pub mod event_hub;
pub mod http;
pub mod pipeline;

#[cfg(test)]
mod event_hub_tests;

#[cfg(test)]
mod pipeline_tests;
