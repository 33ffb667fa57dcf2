fn main() {
    if let Err(err) = runner_race_lib::run() {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
