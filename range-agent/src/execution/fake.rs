//! Recording runner for backend tests.

use super::{CommandOutput, CommandRunner, ExecError};
use std::cell::RefCell;

type Handler = Box<dyn Fn(&[String]) -> Option<CommandOutput>>;

/// Records every invocation. Responses come from the first handler that
/// answers, otherwise the command succeeds with empty output.
#[derive(Default)]
pub struct FakeRunner {
    calls: RefCell<Vec<Vec<String>>>,
    detached: RefCell<Vec<Vec<String>>>,
    handlers: Vec<Handler>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers invocations whose argv starts with `prefix`.
    pub fn respond(mut self, prefix: &[&str], output: CommandOutput) -> Self {
        let prefix: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        self.handlers.push(Box::new(move |argv| {
            argv.starts_with(&prefix).then(|| output.clone())
        }));
        self
    }

    pub fn with_handler(mut self, handler: impl Fn(&[String]) -> Option<CommandOutput> + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|argv| argv.join(" ")).collect()
    }

    pub fn detached(&self) -> Vec<String> {
        self.detached.borrow().iter().map(|argv| argv.join(" ")).collect()
    }

    fn argv(program: &str, args: &[&str]) -> Vec<String> {
        std::iter::once(program).chain(args.iter().copied()).map(String::from).collect()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ExecError> {
        let argv = Self::argv(program, args);
        let output = self
            .handlers
            .iter()
            .find_map(|h| h(&argv))
            .unwrap_or_else(|| CommandOutput::ok(""));
        self.calls.borrow_mut().push(argv);
        Ok(output)
    }

    fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<(), ExecError> {
        let argv = Self::argv(program, args);
        let failed = self.handlers.iter().find_map(|h| h(&argv)).is_some_and(|o| !o.success);
        self.detached.borrow_mut().push(argv);
        if failed {
            Err(ExecError::Spawn {
                program: program.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            })
        } else {
            Ok(())
        }
    }
}
