pub mod agent;
pub mod area;
pub mod config;
pub mod env;
pub mod experiment;
pub mod flower;
pub mod math;
pub mod nn;
pub mod physics;
