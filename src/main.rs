fn main() {
    if let Err(err) = cost_reconcile::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
