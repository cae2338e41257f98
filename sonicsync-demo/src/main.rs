mod scenario;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let seconds = args
        .iter()
        .position(|arg| arg == "--seconds")
        .and_then(|i| args.get(i + 1))
        .and_then(|value| value.parse().ok())
        .unwrap_or(8.0);

    if args.iter().any(|arg| arg == "--device") {
        scenario::run_device(seconds)
    } else {
        scenario::run_headless(seconds)
    }
}
