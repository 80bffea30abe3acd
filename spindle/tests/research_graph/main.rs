mod common;
mod invoke;
