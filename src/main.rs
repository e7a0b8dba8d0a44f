pub mod config;
pub mod debounce;
pub mod hardware;
pub mod publisher;
pub mod sampler;
pub mod shutdown;
pub mod snapshot;

use crate::config::{resolve_config_path, InputConfig};
use crate::hardware::adc::Mcp3008;
use crate::hardware::gpio::GpioButtons;
use crate::hardware::MonotonicClock;
use crate::sampler::Sampler;
use crate::shutdown::ShutdownSignals;
use color_eyre::{eyre::eyre, eyre::WrapErr, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_LOG_FILTER: &str = "info";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup()?;

    // Installed first so a signal during startup stops the loop instead of the process
    let cancel = CancellationToken::new();
    let signals = ShutdownSignals::register();

    let config_path = resolve_config_path(std::env::args().nth(1));
    let config = InputConfig::load(config_path.as_deref())
        .await
        .wrap_err("Failed to load configuration")?;

    // Peripherals are acquired before the first tick and dropped on every early return
    info!("Initializing GPIO and SPI peripherals");
    let buttons = GpioButtons::open(&config.buttons, config.gpio.pull)
        .wrap_err("Failed to set up button pins")?;
    let adc = Mcp3008::open(&config.spi).wrap_err("Failed to open MCP3008")?;

    let mut sampler = Sampler::create(
        &config,
        Box::new(buttons),
        Box::new(adc),
        Box::new(MonotonicClock::new()),
    )?
    .initialize()?;

    signals.spawn(cancel.clone());
    // Let the listener pick up a signal queued during startup before the first tick
    tokio::task::yield_now().await;

    let result = sampler.run(&cancel).await;
    let stats = sampler.shutdown();

    match result {
        Ok(_) => {
            info!("GPIO reader stopped after {} ticks", stats.ticks);
            Ok(())
        }
        Err(e) => {
            error!("GPIO reader failed: {}", e);
            Err(eyre!(e))
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let rust_log = std::env::var("RUST_LOG").ok();
    FmtSubscriber::builder()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

// RUST_LOG directives, or info when unset or unparsable
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn log_filter_follows_rust_log() {
        assert_eq!(
            log_filter(Some("debug")).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
        assert_eq!(
            log_filter(Some("warn,gpioinput=trace")).max_level_hint(),
            Some(LevelFilter::TRACE)
        );
    }

    #[test]
    fn log_filter_defaults_to_info() {
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(
            log_filter(Some("gpioinput=loud")).max_level_hint(),
            Some(LevelFilter::INFO)
        );
    }
}
