pub mod browser;
pub mod dom;
pub mod input;
pub mod page;
pub mod target;
