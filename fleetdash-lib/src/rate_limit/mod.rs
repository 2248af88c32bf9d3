//! Local quota on live upstream calls.

mod budget;

pub use budget::CallBudget;
