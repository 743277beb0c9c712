//! SimOS configuration
//!
//! The immutable tuning record consumed at construction, plus the
//! key/value config-file parser. The file format is line based:
//! `key value` or `key=value`, `#` starts a comment, and values may be
//! double-quoted (`scheduler "rr"` is accepted).

use core::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Scheduling policy selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedPolicy {
    /// First-come-first-served: strict arrival-sequence order, no preemption.
    Fcfs,
    /// Round-robin: preemptive, quantum measured in instructions.
    RoundRobin,
}

impl FromStr for SchedPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fcfs" => Ok(SchedPolicy::Fcfs),
            "rr" => Ok(SchedPolicy::RoundRobin),
            _ => Err(ConfigError::InvalidValue {
                key: "scheduler".into(),
                value: s.into(),
            }),
        }
    }
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedPolicy::Fcfs => write!(f, "fcfs"),
            SchedPolicy::RoundRobin => write!(f, "rr"),
        }
    }
}

/// Errors surfaced while loading or validating a configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be opened or read.
    Io(std::io::Error),
    /// A recognized key carried a value that does not parse.
    InvalidValue { key: String, value: String },
    /// The loaded record is internally inconsistent.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read config file: {}", e),
            ConfigError::InvalidValue { key, value } => {
                write!(f, "invalid value for {}: {:?}", key, value)
            }
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

/// Immutable tuning record for the whole emulator.
///
/// Field names track the config-file keys one to one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Number of simulated CPU cores (`num-cpu`).
    pub num_cpu: usize,
    /// Scheduling policy (`scheduler`).
    pub scheduler: SchedPolicy,
    /// RR quantum in instructions (`quantum-cycles`).
    pub quantum_cycles: u32,
    /// Generator period in ticks (`batch-process-freq`).
    pub batch_process_freq: u64,
    /// Minimum generated program length (`min-ins`).
    pub min_ins: usize,
    /// Maximum generated program length (`max-ins`).
    pub max_ins: usize,
    /// Per-instruction pacing delay in milliseconds (`delay-per-exec`).
    pub delay_per_exec: u64,
    /// Total physical memory in bytes (`max-overall-mem`).
    pub max_overall_mem: usize,
    /// Frame size in bytes (`mem-per-frame`).
    pub mem_per_frame: usize,
    /// Smallest per-process allocation in bytes (`min-mem-per-proc`).
    pub min_mem_per_proc: usize,
    /// Largest per-process allocation in bytes (`max-mem-per-proc`).
    pub max_mem_per_proc: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_cpu: 4,
            scheduler: SchedPolicy::RoundRobin,
            quantum_cycles: 5,
            batch_process_freq: 1,
            min_ins: 1000,
            max_ins: 2000,
            delay_per_exec: 100,
            max_overall_mem: 16384,
            mem_per_frame: 16,
            min_mem_per_proc: 64,
            max_mem_per_proc: 4096,
        }
    }
}

impl Config {
    /// Load a configuration from a key/value file.
    ///
    /// Unknown keys are ignored with a warning so config files can carry
    /// extra annotations; recognized keys with unparseable values are hard
    /// errors. The result is validated before it is returned.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref())?;
        let mut config = Config::default();

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // `key value` or `key=value`
            let (key, value) = match line.split_once(' ').or_else(|| line.split_once('=')) {
                Some(pair) => pair,
                None => continue,
            };
            let key = key.trim();
            // `key value`, `key=value`, and `key = value` all normalize here
            let mut value = value.trim_start_matches('=').trim();

            if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                value = &value[1..value.len() - 1];
            }

            config.apply(key, value)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
            value.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.into(),
                value: value.into(),
            })
        }

        match key {
            "num-cpu" => self.num_cpu = parse(key, value)?,
            "scheduler" => self.scheduler = value.parse()?,
            "quantum-cycles" => self.quantum_cycles = parse(key, value)?,
            "batch-process-freq" => self.batch_process_freq = parse(key, value)?,
            "min-ins" => self.min_ins = parse(key, value)?,
            "max-ins" => self.max_ins = parse(key, value)?,
            "delay-per-exec" => self.delay_per_exec = parse(key, value)?,
            "max-overall-mem" => self.max_overall_mem = parse(key, value)?,
            "mem-per-frame" => self.mem_per_frame = parse(key, value)?,
            "min-mem-per-proc" => self.min_mem_per_proc = parse(key, value)?,
            "max-mem-per-proc" => self.max_mem_per_proc = parse(key, value)?,
            other => log::warn!("ignoring unknown config key {:?}", other),
        }
        Ok(())
    }

    /// Check internal consistency of the record.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_cpu == 0 {
            return Err(ConfigError::Invalid("num-cpu must be at least 1".into()));
        }
        if self.min_ins == 0 || self.min_ins > self.max_ins {
            return Err(ConfigError::Invalid(
                "min-ins must be in [1, max-ins]".into(),
            ));
        }
        if !self.mem_per_frame.is_power_of_two() || !self.max_overall_mem.is_power_of_two() {
            return Err(ConfigError::Invalid(
                "mem-per-frame and max-overall-mem must be powers of two".into(),
            ));
        }
        if self.max_overall_mem % self.mem_per_frame != 0
            || self.max_overall_mem < self.mem_per_frame
        {
            return Err(ConfigError::Invalid(
                "mem-per-frame must divide max-overall-mem".into(),
            ));
        }
        if !self.min_mem_per_proc.is_power_of_two() || !self.max_mem_per_proc.is_power_of_two() {
            return Err(ConfigError::Invalid(
                "per-process memory bounds must be powers of two".into(),
            ));
        }
        if self.min_mem_per_proc > self.max_mem_per_proc {
            return Err(ConfigError::Invalid(
                "min-mem-per-proc must not exceed max-mem-per-proc".into(),
            ));
        }
        Ok(())
    }

    /// Human-readable rendering for the shell's `initialize` output.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("---- Scheduler Configuration ----\n");
        out.push_str(&format!("Number of CPU Cores   : {}\n", self.num_cpu));
        out.push_str(&format!("Scheduling Algorithm  : {}\n", self.scheduler));
        out.push_str(&format!("Quantum Cycles        : {}\n", self.quantum_cycles));
        out.push_str(&format!(
            "Batch Process Freq    : {}\n",
            self.batch_process_freq
        ));
        out.push_str(&format!("Min Instructions      : {}\n", self.min_ins));
        out.push_str(&format!("Max Instructions      : {}\n", self.max_ins));
        out.push_str(&format!("Delay per Execution   : {}\n", self.delay_per_exec));
        out.push_str(&format!(
            "Max Overall Memory    : {} bytes\n",
            self.max_overall_mem
        ));
        out.push_str(&format!(
            "Memory per Frame      : {} bytes\n",
            self.mem_per_frame
        ));
        out.push_str(&format!(
            "Min Memory per Process: {} bytes\n",
            self.min_mem_per_proc
        ));
        out.push_str(&format!(
            "Max Memory per Process: {} bytes\n",
            self.max_mem_per_proc
        ));
        out.push_str("----------------------------------\n");
        out
    }
}
