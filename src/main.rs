fn main() {
    if let Err(err) = record_reconciler::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
