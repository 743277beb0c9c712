//! SimOS interactive shell
//!
//! A line-oriented front end over the scheduler's query API. The shell
//! owns no scheduling state: every command reads snapshots or calls the
//! public scheduler contract.

mod command;

use std::io::{self, BufRead, Write};

use log::LevelFilter;

use simos_config::Config;
use simos_process::parse_instruction;
use simos_scheduler::{report, Scheduler, SchedulerError};
use simos_memory::FileBackingStore;

use command::{parse, Command, HELP_TEXT};

const DEFAULT_CONFIG_PATH: &str = "config.txt";
const BACKING_STORE_PATH: &str = "simos-backing-store.txt";
const REPORT_PATH: &str = "simos-report.txt";

/// Minimal stderr sink for the `log` facade.
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logger() {
    let level = match std::env::var("SIMOS_LOG").as_deref() {
        Ok("debug") => LevelFilter::Debug,
        Ok("info") => LevelFilter::Info,
        Ok("off") => LevelFilter::Off,
        _ => LevelFilter::Warn,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

struct Shell {
    config_path: String,
    scheduler: Option<Scheduler<FileBackingStore>>,
}

impl Shell {
    fn new(config_path: String) -> Self {
        Self {
            config_path,
            scheduler: None,
        }
    }

    fn scheduler(&self) -> Option<&Scheduler<FileBackingStore>> {
        if self.scheduler.is_none() {
            println!("Please initialize the system first.");
        }
        self.scheduler.as_ref()
    }

    fn initialize(&mut self) {
        let config = match Config::load_from_file(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                println!("Failed to initialize system: {}", e);
                return;
            }
        };
        print!("{}", config.render());

        match Scheduler::with_file_store(config, BACKING_STORE_PATH) {
            Ok(scheduler) => {
                self.scheduler = Some(scheduler);
                println!("System initialized successfully!");
            }
            Err(e) => println!("Failed to initialize system: {}", e),
        }
    }

    fn dispatch(&mut self, command: Command) -> bool {
        match command {
            Command::Initialize => self.initialize(),
            Command::SchedulerStart => {
                if let Some(scheduler) = self.scheduler() {
                    scheduler.start();
                    scheduler.enable_dummy_generation();
                    println!("Dummy process generation enabled.");
                }
            }
            Command::SchedulerStop => {
                if let Some(scheduler) = self.scheduler() {
                    scheduler.disable_dummy_generation();
                    println!("Dummy process generation disabled.");
                }
            }
            Command::ScreenNew { name, memory } => {
                if let Some(scheduler) = self.scheduler() {
                    match scheduler.create_process(Some(name.clone()), memory, None) {
                        Ok(pid) => println!("Created process {} ({}).", name, pid),
                        Err(e) => println!("Cannot create process: {}", e),
                    }
                }
            }
            Command::ScreenCustom {
                name,
                memory,
                instructions,
            } => {
                if self.scheduler.is_none() {
                    println!("Please initialize the system first.");
                    return true;
                }
                let parsed: Result<Vec<_>, _> = instructions
                    .split(';')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(parse_instruction)
                    .collect();
                match parsed {
                    Ok(program) => {
                        let scheduler = self.scheduler.as_ref().expect("checked above");
                        match scheduler.create_process(Some(name.clone()), Some(memory), Some(program))
                        {
                            Ok(pid) => println!("Created process {} ({}).", name, pid),
                            Err(e) => println!("Cannot create process: {}", e),
                        }
                    }
                    Err(e) => println!("Invalid command: {}", e),
                }
            }
            Command::ScreenResume { name } => {
                if let Some(scheduler) = self.scheduler() {
                    match scheduler.find(&name) {
                        Some(process) => {
                            if let Some(message) = &process.violation_message {
                                println!("{}", message);
                            } else {
                                println!("Process: {} ({})", process.name, process.pid);
                                println!("State: {}  Instructions: {} / {}", process.state, process.executed, process.total);
                                for line in &process.log {
                                    println!("{}", line);
                                }
                            }
                        }
                        None => println!("Process {} not found.", name),
                    }
                }
            }
            Command::ScreenList => {
                if let Some(scheduler) = self.scheduler() {
                    print!(
                        "{}",
                        report::render_system_status(&scheduler.system_status())
                    );
                    print!(
                        "{}",
                        report::render_process_tables(
                            &scheduler.list_running(),
                            &scheduler.list_terminated()
                        )
                    );
                }
            }
            Command::ProcessSmi => {
                if let Some(scheduler) = self.scheduler() {
                    print!(
                        "{}",
                        report::render_memory_monitor(
                            &scheduler.vm_stats(),
                            &scheduler.memory_status()
                        )
                    );
                }
            }
            Command::VmStat => {
                if let Some(scheduler) = self.scheduler() {
                    print!(
                        "{}",
                        report::render_vmstat(&scheduler.vm_stats(), &scheduler.memory_status())
                    );
                }
            }
            Command::ReportUtil => {
                if let Some(scheduler) = self.scheduler() {
                    match scheduler.generate_report(REPORT_PATH) {
                        Ok(()) => println!("Report generated: {}", REPORT_PATH),
                        Err(SchedulerError::Busy) => {
                            println!("System busy, please try generating report again.")
                        }
                        Err(e) => println!("Cannot generate report: {}", e),
                    }
                }
            }
            Command::Help => print!("{}", HELP_TEXT),
            Command::Exit => {
                if let Some(scheduler) = &self.scheduler {
                    scheduler.stop();
                }
                return false;
            }
            Command::Unknown(line) => println!("Unknown command: {}", line),
        }
        true
    }
}

fn main() {
    init_logger();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let mut shell = Shell::new(config_path);

    println!("SimOS emulator. Type 'help' for commands.");

    let stdin = io::stdin();
    loop {
        print!("simos> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                log::warn!("stdin read failed: {}", e);
                break;
            }
        }

        match parse(&line) {
            Some(command) => {
                if !shell.dispatch(command) {
                    break;
                }
            }
            None => continue,
        }
    }
}
