pub mod controlling;
