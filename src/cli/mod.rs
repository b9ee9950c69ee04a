//! Terminal output for runs started from the command line

mod console;

pub use console::ConsolePrinter;
