#[cfg(target_os = "linux")]
mod app {
    use {
        clap::{Parser, Subcommand},
        log::debug,
        rngscope::{
            errors::{MemoryError, ProcessListError},
            locator::{self, MtAddresses},
            memory::ProcessMemory,
            process,
            tui::{self, UiConfig, UiError},
        },
        std::path::{Path, PathBuf},
        thiserror::Error,
    };

    const DEFAULT_PROCESS_NAME: &str = "FFXII_TZA";
    const LOG_ENV: &str = "RNGSCOPE_LOG";

    #[derive(Parser)]
    #[command(version, about = "Observe the MT19937 state of a running game process")]
    struct Cli {
        /// Append log output to this file.
        #[arg(long, default_value = "rngscope.log", value_name = "FILE")]
        log_file: PathBuf,

        #[command(subcommand)]
        command: Command,
    }

    #[derive(Subcommand)]
    enum Command {
        /// Run the live terminal display.
        Ui {
            /// Substring the target process name must contain.
            #[arg(long, default_value = DEFAULT_PROCESS_NAME, value_name = "NAME")]
            process: String,
            /// How many upcoming percentages to project per probe.
            #[arg(long, default_value_t = 1000, value_name = "N")]
            lookahead: usize,
        },
        /// Locate the generator state and print its addresses once.
        Info {
            /// Substring the target process name must contain.
            #[arg(long, default_value = DEFAULT_PROCESS_NAME, value_name = "NAME")]
            process: String,
            /// Use this state-array address instead of scanning.
            #[arg(long, value_name = "HEX", value_parser = parse_hex_addr, requires = "mti")]
            mt: Option<u64>,
            /// Use this index-cursor address instead of scanning.
            #[arg(long, value_name = "HEX", value_parser = parse_hex_addr, requires = "mt")]
            mti: Option<u64>,
        },
        /// Reserved.
        #[command(hide = true)]
        Diag,
    }

    #[derive(Debug, Error)]
    enum AppError {
        #[error("cannot open the log file {0}")]
        OpenLogFile(PathBuf, #[source] std::io::Error),
        #[error("no process matching `{0}` is running")]
        NoProcess(String),
        #[error("cannot find the MT19937 state in the target process")]
        AddressesNotFound,
        #[error(transparent)]
        ProcessList(#[from] ProcessListError),
        #[error(transparent)]
        Memory(#[from] MemoryError),
        #[error(transparent)]
        Ui(#[from] UiError),
    }

    fn parse_hex_addr(s: &str) -> Result<u64, String> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u64::from_str_radix(digits, 16).map_err(|e| format!("`{s}` is not a hex address: {e}"))
    }

    fn init_logging(path: &Path) -> Result<(), AppError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AppError::OpenLogFile(path.to_path_buf(), e))?;

        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Info)
            .parse_env(env_logger::Env::new().filter(LOG_ENV))
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        debug!("logging setup complete");
        Ok(())
    }

    fn run_info(process: &str, mt: Option<u64>, mti: Option<u64>) -> Result<(), AppError> {
        let pinfo = process::find_process(process)?
            .ok_or_else(|| AppError::NoProcess(process.to_string()))?;

        let mut mem = ProcessMemory::open(pinfo.pid)?;
        let addrs = match (mt, mti) {
            (Some(mt_addr), Some(mti_addr)) => MtAddresses { mti_addr, mt_addr },
            _ => locator::find_mt_addresses(&mut mem)?.ok_or(AppError::AddressesNotFound)?,
        };
        let data = locator::read_mt_and_mti(&mut mem, addrs.mt_addr)?;

        println!("Process:     {} (pid {})", pinfo.name, pinfo.pid);
        println!("MT address:  {:#x}", addrs.mt_addr);
        println!("MTI address: {:#x}", addrs.mti_addr);
        println!("MTI value:   {}", data.mti());
        Ok(())
    }

    pub fn main() -> std::process::ExitCode {
        let cli = Cli::parse();

        let run = init_logging(&cli.log_file).and_then(|()| match cli.command {
            Command::Ui { process, lookahead } => tui::run(UiConfig {
                process_name: process,
                lookahead,
            })
            .map_err(AppError::from),
            Command::Info { process, mt, mti } => run_info(&process, mt, mti),
            // Reserved for future diagnostics.
            Command::Diag => Ok(()),
        });

        match run {
            Ok(()) => std::process::ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: {e}");
                let mut source = std::error::Error::source(&e);
                while let Some(cause) = source {
                    eprintln!("  caused by: {cause}");
                    source = cause.source();
                }
                std::process::ExitCode::FAILURE
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn main() -> std::process::ExitCode {
    app::main()
}

#[cfg(not(target_os = "linux"))]
fn main() -> std::process::ExitCode {
    eprintln!("rngscope only reads Linux /proc targets");
    std::process::ExitCode::FAILURE
}
