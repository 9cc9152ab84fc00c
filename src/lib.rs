#![allow(non_upper_case_globals)]

pub mod actor;
pub mod common;
pub mod engine;
pub mod model;
pub mod sys;
pub mod window;
