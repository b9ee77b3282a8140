use std::path::PathBuf;

use log::LevelFilter;

pub fn setup_logger(
    log_level: LevelFilter,
    log_file: &Option<PathBuf>,
) -> Result<(), fern::InitError> {
    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log_level);

    let dispatch = match log_file {
        None => dispatch.chain(std::io::stdout()),
        Some(f) => dispatch.chain(fern::log_file(f)?),
    };
    dispatch.apply()?;
    Ok(())
}
