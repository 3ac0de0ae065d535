pub mod debounce;
pub mod url;
