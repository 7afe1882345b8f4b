fn main() {
    if let Err(error) = live_feed_bridge_lib::run() {
        eprintln!("live-feed-bridge: {error}");
        std::process::exit(1);
    }
}
