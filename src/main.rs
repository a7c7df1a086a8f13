fn main() {
    if let Err(e) = dataport::run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
