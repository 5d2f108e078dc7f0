//! Harness composition: option extraction, environment bracketing, and the
//! test-execution engine invocation.
//!
//! This module is the whole harness's single entry point. A test binary with
//! `harness = false` calls [`run_harness`] from its `main`:
//!
//! ```no_run
//! use std::process::ExitCode;
//! use testkit_rs::{run_harness, Trial};
//!
//! fn main() -> ExitCode {
//!     let trials = vec![Trial::test("it_works", || Ok(()))];
//!     run_harness(std::env::args_os(), trials)
//! }
//! ```
//!
//! # Exit codes
//! - `0`: every trial passed and all environments tore down cleanly.
//! - `1`: trial failures or an environment teardown failure.
//! - `2`: invalid configuration, reported before any trial runs.

use std::ffi::OsString;
use std::process::ExitCode;

use libtest_mimic::Arguments;
use thiserror::Error;

use crate::alloc_env::{AllocatorEnv, EnvError};
use crate::scratch_dir::ScratchDirError;

pub use libtest_mimic::{Failed, Trial};

/// Allocator mode used when `--rmm_mode` is absent.
pub const DEFAULT_RMM_MODE: &str = "pool";

const RMM_MODE_FLAG: &str = "--rmm_mode";

/// Fatal harness errors: configuration problems and environment failures.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// `--rmm_mode` was present but syntactically unusable.
    #[error("malformed option {0:?}: expected --rmm_mode=<cuda|pool|managed>")]
    MalformedOption(String),
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error(transparent)]
    Scratch(#[from] ScratchDirError),
}

/// A global setup/teardown pair bracketing the whole run.
///
/// Registered environments are set up in order before the first trial and
/// torn down in reverse order after the last, the engine-environment contract
/// the rest of the harness relies on.
pub trait TestEnvironment {
    fn set_up(&mut self) -> Result<(), HarnessError>;
    fn tear_down(&mut self) -> Result<(), HarnessError>;
}

/// Options the harness extracts before the engine sees the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessOptions {
    /// Allocator mode string, stored unvalidated; the environment parses it.
    pub rmm_mode: String,
    /// Every argument the harness did not recognize, in order, passed through
    /// to the test-execution engine untouched.
    pub engine_args: Vec<OsString>,
}

/// Extracts `--rmm_mode=<value>` from the argument list.
///
/// Unrecognized arguments (including the program name) pass through to
/// `engine_args` without error. A bare `--rmm_mode`, an empty value, or a
/// non-UTF-8 value is malformed.
///
/// # Errors
/// `MalformedOption` on unusable `--rmm_mode` syntax.
pub fn parse_harness_opts(
    args: impl IntoIterator<Item = OsString>,
) -> Result<HarnessOptions, HarnessError> {
    let mut rmm_mode: Option<String> = None;
    let mut engine_args = Vec::new();

    for arg in args {
        let recognized = match arg.to_str() {
            Some(flag) if flag == RMM_MODE_FLAG => {
                return Err(HarnessError::MalformedOption(flag.to_string()));
            }
            Some(flag) => match flag.strip_prefix(RMM_MODE_FLAG) {
                Some(rest) if rest.starts_with('=') => {
                    let value = &rest[1..];
                    if value.is_empty() {
                        return Err(HarnessError::MalformedOption(flag.to_string()));
                    }
                    rmm_mode = Some(value.to_string());
                    true
                }
                _ => false,
            },
            None => {
                let lossy = arg.to_string_lossy();
                if lossy.starts_with(RMM_MODE_FLAG) {
                    return Err(HarnessError::MalformedOption(lossy.into_owned()));
                }
                false
            }
        };

        if !recognized {
            engine_args.push(arg);
        }
    }

    Ok(HarnessOptions {
        rmm_mode: rmm_mode.unwrap_or_else(|| DEFAULT_RMM_MODE.to_string()),
        engine_args,
    })
}

/// Runs the whole harness: parse options, bracket the allocator environment
/// around the engine, and map the conclusion to a process exit status.
pub fn run_harness(args: impl IntoIterator<Item = OsString>, trials: Vec<Trial>) -> ExitCode {
    run_harness_with(args, Vec::new(), trials)
}

/// [`run_harness`] with extra global environments.
///
/// The allocator environment is always registered first; extras follow in the
/// given order and are torn down in reverse.
pub fn run_harness_with(
    args: impl IntoIterator<Item = OsString>,
    extra_envs: Vec<Box<dyn TestEnvironment>>,
    trials: Vec<Trial>,
) -> ExitCode {
    let opts = match parse_harness_opts(args) {
        Ok(opts) => opts,
        Err(err) => {
            eprintln!("testkit: {err}");
            return ExitCode::from(2);
        }
    };

    let mut envs: Vec<Box<dyn TestEnvironment>> =
        vec![Box::new(AllocatorEnv::new(opts.rmm_mode.clone()))];
    envs.extend(extra_envs);

    run_with_environments(&opts, &mut envs, trials)
}

fn run_with_environments(
    opts: &HarnessOptions,
    envs: &mut [Box<dyn TestEnvironment>],
    trials: Vec<Trial>,
) -> ExitCode {
    // The engine's argument parser terminates the process on arguments it
    // rejects. Parse before any environment is set up so a fatal argument
    // error cannot strand an initialized environment without its teardown.
    let engine_args = Arguments::from_iter(opts.engine_args.iter().cloned());

    for idx in 0..envs.len() {
        if let Err(err) = envs[idx].set_up() {
            eprintln!("testkit: environment setup failed: {err}");
            // Unwind whatever was already set up, in reverse.
            for env in envs[..idx].iter_mut().rev() {
                if let Err(err) = env.tear_down() {
                    eprintln!("testkit: environment teardown failed: {err}");
                }
            }
            return ExitCode::from(2);
        }
    }

    let conclusion = libtest_mimic::run(&engine_args, trials);

    let mut teardown_failed = false;
    for env in envs.iter_mut().rev() {
        if let Err(err) = env.tear_down() {
            eprintln!("testkit: environment teardown failed: {err}");
            teardown_failed = true;
        }
    }

    if conclusion.has_failed() || teardown_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
