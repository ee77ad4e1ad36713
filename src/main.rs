fn main() {
    if let Err(err) = cubegen::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
