pub mod catalog;
pub mod classify;
pub mod eval;
pub mod flask;
pub mod matchers;
pub mod pdq;
pub mod powershell;
pub mod shared;
