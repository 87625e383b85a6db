fn main() {
    if let Err(err) = pomatrack_lib::run() {
        eprintln!("pomatrack: {err:#}");
        std::process::exit(1);
    }
}
