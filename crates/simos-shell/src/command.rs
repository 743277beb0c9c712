//! Shell command parsing

/// One parsed shell command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Load the configuration and build the scheduler.
    Initialize,
    /// Start the workers and enable dummy-process generation.
    SchedulerStart,
    /// Stop dummy-process generation (workers keep running).
    SchedulerStop,
    /// `screen -s <name> [memory]` - create a process with a generated
    /// program.
    ScreenNew {
        name: String,
        memory: Option<usize>,
    },
    /// `screen -c <name> <memory> "<ins>; <ins>"` - create a process with
    /// explicit instructions.
    ScreenCustom {
        name: String,
        memory: usize,
        instructions: String,
    },
    /// `screen -r <name>` - show a process's log and status.
    ScreenResume { name: String },
    /// `screen -ls` - CPU status and process tables.
    ScreenList,
    /// Process and memory monitor.
    ProcessSmi,
    /// Paging and tick counters.
    VmStat,
    /// Write the utilization report file.
    ReportUtil,
    Help,
    Exit,
    /// Anything unrecognized, kept verbatim for the error message.
    Unknown(String),
}

/// Split a line into whitespace tokens, keeping double-quoted spans whole.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Parse one input line.
pub fn parse(line: &str) -> Option<Command> {
    let tokens = tokenize(line);
    let first = tokens.first()?.as_str();

    let command = match (first, tokens.get(1).map(String::as_str)) {
        ("initialize", _) => Command::Initialize,
        ("scheduler-start", _) | ("scheduler", Some("start")) => Command::SchedulerStart,
        ("scheduler-stop", _) | ("scheduler", Some("stop")) => Command::SchedulerStop,
        ("screen", Some("-s")) => match tokens.get(2) {
            Some(name) => Command::ScreenNew {
                name: name.clone(),
                memory: tokens.get(3).and_then(|t| t.parse().ok()),
            },
            None => Command::Unknown(line.trim().to_string()),
        },
        ("screen", Some("-c")) => {
            match (tokens.get(2), tokens.get(3).and_then(|t| t.parse().ok()), tokens.get(4)) {
                (Some(name), Some(memory), Some(instructions)) => Command::ScreenCustom {
                    name: name.clone(),
                    memory,
                    instructions: instructions.clone(),
                },
                _ => Command::Unknown(line.trim().to_string()),
            }
        }
        ("screen", Some("-r")) => match tokens.get(2) {
            Some(name) => Command::ScreenResume { name: name.clone() },
            None => Command::Unknown(line.trim().to_string()),
        },
        ("screen", Some("-ls")) => Command::ScreenList,
        ("process-smi", _) => Command::ProcessSmi,
        ("vmstat", _) => Command::VmStat,
        ("report-util", _) => Command::ReportUtil,
        ("help", _) => Command::Help,
        ("exit", _) | ("quit", _) => Command::Exit,
        _ => Command::Unknown(line.trim().to_string()),
    };
    Some(command)
}

pub const HELP_TEXT: &str = "\
Available commands:
  initialize                       Load config.txt and build the system.
  scheduler-start                  Start dummy process generation.
  scheduler-stop                   Stop dummy process generation.
  screen -s <name> [mem]           Create a process with a generated program.
  screen -c <name> <mem> \"<ins>\"   Create a process from ';'-separated instructions.
  screen -r <name>                 Show a process's log and status.
  screen -ls                       Show CPU and process status.
  process-smi                      Process and memory monitor.
  vmstat                           Memory and CPU tick counters.
  report-util                      Save the utilization report to a file.
  help                             This text.
  exit                             Leave the emulator.
";
