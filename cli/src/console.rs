use std::fmt::Write;
use std::str::FromStr;

use crossbeam::channel::Receiver;
use log::{debug, info};
use rustyline::Editor;
use rustyline::error::ReadlineError;
use thiserror::Error;

use dream_engine::core::log::LogMessage;
use dream_engine::core::runner;
use dream_engine::{EngineError, Event, ProjectRuntime};

const PROMPT: &str = "dream> ";

const HELP: &str = "\
step [n]                 run n frames (default 1)
tree                     print the scene graph
nodes                    count nodes in the scene
delete <node>            flag a node for deletion
event <node> <kind>      queue an event on a node
enable <component>       resume a component
disable <component>      pause a component
stats                    frame, scene and pool counters
help                     this text
quit                     leave the console";

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("{0}")]
    Parse(String),
    #[error("no node named {0:?}")]
    UnknownNode(String),
    #[error("no component named {0:?}")]
    UnknownComponent(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Step(u64),
    Tree,
    Nodes,
    Delete(String),
    Event { node: String, kind: String },
    Enable(String),
    Disable(String),
    Stats,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words
            .next()
            .ok_or_else(|| ConsoleError::Parse("empty command".into()))?;
        let mut argument = |what: &str| {
            words
                .next()
                .map(str::to_string)
                .ok_or_else(|| ConsoleError::Parse(format!("{} needs a {}", verb, what)))
        };

        let command = match verb {
            "step" | "s" => match argument("frame count") {
                Ok(count) => Command::Step(
                    count
                        .parse()
                        .map_err(|_| ConsoleError::Parse(format!("bad frame count {:?}", count)))?,
                ),
                Err(_) => Command::Step(1),
            },
            "tree" => Command::Tree,
            "nodes" => Command::Nodes,
            "delete" => Command::Delete(argument("node name")?),
            "event" => {
                let node = argument("node name")?;
                let kind = argument("event kind")?;
                Command::Event { node, kind }
            }
            "enable" => Command::Enable(argument("component name")?),
            "disable" => Command::Disable(argument("component name")?),
            "stats" => Command::Stats,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(ConsoleError::Parse(format!("unknown command {:?}", other))),
        };
        Ok(command)
    }
}

/// Line-based control over a [`ProjectRuntime`]. Log output produced while a
/// command runs is printed after the command's own output.
pub struct Console<'a> {
    runtime: &'a mut ProjectRuntime,
    log_recv: Option<Receiver<LogMessage>>,
    running: bool,
}

impl<'a> Console<'a> {
    pub fn new(runtime: &'a mut ProjectRuntime, log_recv: Option<Receiver<LogMessage>>) -> Self {
        Self {
            runtime,
            log_recv,
            running: true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Reads commands until `quit`, end of input or Ctrl-C.
    pub fn run(&mut self) -> rustyline::Result<()> {
        let mut editor = Editor::<()>::new();
        info!("Console attached, type `help` for commands");
        self.flush_log();

        while self.running {
            match editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    editor.add_history_entry(line);
                    match self.execute_line(line) {
                        Ok(output) if !output.is_empty() => println!("{}", output),
                        Ok(_) => {}
                        Err(err) => println!("error: {}", err),
                    }
                    self.flush_log();
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    self.running = false;
                }
                Err(err) => return Err(err),
            }
        }
        debug!("Console detached");
        Ok(())
    }

    pub fn execute_line(&mut self, line: &str) -> Result<String, ConsoleError> {
        let command = line.parse()?;
        self.execute(command)
    }

    pub fn execute(&mut self, command: Command) -> Result<String, ConsoleError> {
        match command {
            Command::Step(frames) => {
                let mut out = String::new();
                for _ in 0..frames {
                    let report = runner::once(self.runtime)?;
                    let _ = writeln!(
                        out,
                        "frame {}: {} node(s), {} created, {} destroyed",
                        report.frame,
                        report.node_count,
                        report.instances_created,
                        report.destroyed.len()
                    );
                }
                Ok(out.trim_end().to_string())
            }
            Command::Tree => Ok(self.runtime.scene().read().print_tree().trim_end().to_string()),
            Command::Nodes => Ok(format!("{} node(s)", self.runtime.scene().read().node_count())),
            Command::Delete(name) => {
                let scene = self.runtime.scene().read();
                let node = scene
                    .find_by_name(&name)
                    .and_then(|id| scene.node(id))
                    .ok_or_else(|| ConsoleError::UnknownNode(name.clone()))?;
                node.set_delete_flag(true);
                Ok(format!("{} flagged for deletion", name))
            }
            Command::Event { node, kind } => {
                let scene = self.runtime.scene().read();
                let target = scene
                    .find_by_name(&node)
                    .and_then(|id| scene.node(id))
                    .ok_or_else(|| ConsoleError::UnknownNode(node.clone()))?;
                target.send_event(Event::new(kind.as_str()));
                Ok(format!("{} queued on {}", kind, node))
            }
            Command::Enable(name) => self.set_enabled(&name, true),
            Command::Disable(name) => self.set_enabled(&name, false),
            Command::Stats => Ok(self.stats()),
            Command::Help => Ok(HELP.to_string()),
            Command::Quit => {
                self.running = false;
                Ok(String::new())
            }
        }
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<String, ConsoleError> {
        let component = self
            .runtime
            .component(name)
            .ok_or_else(|| ConsoleError::UnknownComponent(name.to_string()))?;
        component.state().set_enabled(enabled);
        Ok(format!(
            "{} {}",
            name,
            if enabled { "enabled" } else { "disabled" }
        ))
    }

    fn stats(&self) -> String {
        let time = self.runtime.time();
        let scene = self.runtime.scene().read();
        let mut out = String::new();
        let _ = writeln!(out, "frame      {} ({:?} elapsed)", time.frame, time.time);
        let _ = writeln!(out, "scene      {} [{:?}]", scene.name(), scene.state());
        let _ = writeln!(out, "nodes      {}", scene.node_count());
        let _ = writeln!(out, "instances  {}", self.runtime.caches().len());
        let _ = write!(out, "queued     {:?}", self.runtime.tasks().queued());
        out
    }

    fn flush_log(&self) {
        if let Some(log_recv) = &self.log_recv {
            for message in log_recv.try_iter() {
                println!("{}", message);
            }
        }
    }
}
