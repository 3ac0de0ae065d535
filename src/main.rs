fn main() {
    if let Err(e) = virtualis::cli::main() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
