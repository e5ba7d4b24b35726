pub mod clock;
pub mod composer;
pub mod config;
pub mod context;
pub mod export;
pub mod pipeline;
pub mod polish;
pub mod postprocess;
pub mod scheduler;
pub mod simulation;
pub mod template;
pub mod travel;
pub mod validate;
pub mod variety;
pub mod voice;
