use crate::cli::run;

mod acquisition;
mod classifier;
pub mod cli;
mod config;
pub mod domain;
mod fetch;
pub mod http;
mod jukebox;
mod links;
mod search;
pub mod storage;
#[cfg(test)]
mod testing;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
