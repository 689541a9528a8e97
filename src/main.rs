#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = s5link::cli::parse_args();
    s5link::boot::init_common(matches.get_one::<String>("log-file").map(String::as_str));

    log::info!("Starting s5link daemon");
    s5link::cli::daemon::run(&matches).await
}
