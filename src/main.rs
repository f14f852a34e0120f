//! `kvctl` is a small manual test driver for the store, not a supported
//! command-line interface: the crate's contract is the `kvhash` library
//! API, not this binary's argument parsing.

use std::env;

use kvhash::Store;
use log::info;

fn main() {
    env_logger::init();
    print_banner();

    let name = env::args().nth(1).unwrap_or_else(|| "kvctl_demo".to_string());
    info!("opening store '{name}'");

    if let Err(err) = run(&name) {
        eprintln!("kvctl: {err}");
        std::process::exit(1);
    }
}

fn print_banner() {
    println!("╔══════════════════════════════════╗");
    println!("║  kvhash {:<10}               ║", kvhash::VERSION);
    println!("╚══════════════════════════════════╝");
}

fn run(name: &str) -> kvhash::Result<()> {
    let mut store = Store::open(name)?;

    store.put(b"fruit", b"mango")?;
    store.put(b"color", b"orange")?;
    println!("fruit -> {:?}", store.get(b"fruit")?.map(|v| String::from_utf8_lossy(&v).into_owned()));
    println!("color -> {:?}", store.get(b"color")?.map(|v| String::from_utf8_lossy(&v).into_owned()));

    println!("deleted color: {}", store.delete(b"color")?);
    println!("color -> {:?}", store.get(b"color")?);

    store.rewind();
    print!("keys:");
    while let Some(key) = store.next_record()? {
        print!(" {}", String::from_utf8_lossy(&key));
    }
    println!();

    store.close()
}
