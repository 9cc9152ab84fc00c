use std::path::PathBuf;

use clap::{Parser, Subcommand};
use swapr::common::config::Config;
use swapr::common::log;
use tracing::warn;

#[derive(Parser)]
#[command(name = "swapr")]
#[command(about = "Swap a registered target window with any other window")]
struct Cli {
    /// Read configuration from this file instead of ~/.swapr.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Check the configuration file and exit.
    #[arg(long)]
    validate: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Read requests as JSON lines on stdin and write events as JSON lines on
    /// stdout.
    Run,
    /// Print the windows that can be swapped with.
    Windows,
    /// Print how visible a window is.
    Visibility {
        /// Window server id.
        id: u32,
    },
}

fn main() -> anyhow::Result<()> {
    let opt: Cli = Parser::parse();

    if std::env::var_os("RUST_BACKTRACE").is_none() {
        // SAFETY: We are single threaded at this point.
        unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
    }
    log::init_logging();
    install_panic_hook();

    let mut config = Config::load(opt.config.as_deref())?;

    if opt.validate {
        let issues = config.validate();
        if issues.is_empty() {
            println!("Configuration is valid");
            return Ok(());
        }
        for issue in &issues {
            println!("{issue}");
        }
        anyhow::bail!("{} configuration issue(s) found", issues.len());
    }

    for issue in config.validate() {
        warn!("{issue}; using the default");
    }
    config.auto_fix_values();

    run(config, opt.command.unwrap_or(Command::Run))
}

#[cfg(not(target_os = "macos"))]
fn run(_config: Config, _command: Command) -> anyhow::Result<()> {
    anyhow::bail!("swapr needs the macOS accessibility API")
}

#[cfg(target_os = "macos")]
fn run(config: Config, command: Command) -> anyhow::Result<()> {
    use std::io::BufRead;
    use std::time::Duration;

    use swapr::actor::{self, swapper};
    use swapr::actor::swapper::{Request, Swapper};
    use swapr::engine::{Context, SwapEngine};
    use swapr::sys::accessibility::ensure_accessibility_permission;
    use swapr::sys::actual::Actual;
    use swapr::sys::window_server::WindowServerId;
    use tokio::join;
    use tracing::{debug, error};

    fn read_requests(tx: swapper::Sender) {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    error!(%err, "Failed to read stdin");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Request>(&line) {
                Ok(request) => {
                    if tx.try_send(request).is_err() {
                        return;
                    }
                }
                Err(err) => warn!(%err, %line, "Ignoring malformed request"),
            }
        }
        debug!("stdin closed");
        tx.send(Request::Terminate);
    }

    if !ensure_accessibility_permission() {
        anyhow::bail!(
            "Accessibility permission is required. Enable swapr under System Settings > \
             Privacy & Security > Accessibility and start it again."
        );
    }

    let cx = Context::new(Actual::new(), &config);

    match command {
        Command::Windows => {
            for window in cx.windows() {
                println!("{}", serde_json::to_string(&window.summary())?);
            }
        }
        Command::Visibility { id } => {
            let windows = cx.system.window_list();
            let visibility = cx.visibility.classify_id(&windows, WindowServerId::new(id), None);
            println!("{visibility}");
        }
        Command::Run => {
            let engine = SwapEngine::new(cx, config.settings.swap_mode);
            let (events_tx, mut events_rx) = actor::channel();
            let (requests_tx, requests_rx) = actor::channel();
            let swapper = Swapper::new(
                engine,
                events_tx,
                Duration::from_millis(config.settings.poll_interval_ms),
            );

            std::thread::spawn(move || read_requests(requests_tx));

            let rt = tokio::runtime::Builder::new_current_thread().enable_time().build()?;
            rt.block_on(async move {
                let print_events = async {
                    while let Some((_span, event)) = events_rx.recv().await {
                        match serde_json::to_string(&event) {
                            Ok(line) => println!("{line}"),
                            Err(err) => error!(%err, "Failed to encode event"),
                        }
                    }
                };
                join!(swapper.run(requests_rx), print_events);
            });
        }
    }
    Ok(())
}

#[cfg(panic = "unwind")]
fn install_panic_hook() {
    // Abort on panic instead of unwinding out of the event loop.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        original_hook(info);
        std::process::abort();
    }));
}

#[cfg(not(panic = "unwind"))]
fn install_panic_hook() {}
