fn main() {
    if let Err(err) = archgraph::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
