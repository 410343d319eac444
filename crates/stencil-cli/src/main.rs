fn main() {
    stencil_cli::init_logging();
    if let Err(err) = stencil_cli::run_from_env() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
