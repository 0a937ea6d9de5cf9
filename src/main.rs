fn main() {
    if let Err(err) = service_report_loader::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
