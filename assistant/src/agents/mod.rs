pub mod action;
pub mod catalog;
pub mod planner;
pub mod recovery;
pub mod summarizer;
