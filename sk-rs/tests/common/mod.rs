//! Shared collaborators for the integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};

use sk::event::{EventInfo, EventSpec, EventType, SelfRegistering};
use sk::item::{Command, Condition, Expression, Statement};
use sk::services::{CommandCompiler, EventHost, Grammar, NodeReader};
use sk::{CompileContext, LoaderConfig, Node, ScriptLoader, Services, Trigger};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Indentation-based reader: a line ending in `:` opens a section whose
/// body is the following more-indented lines.  `#` lines and blank lines
/// are dropped.
pub struct IndentReader;

impl NodeReader for IndentReader {
    fn read(&self, path: &Path) -> io::Result<Node> {
        Ok(parse_tree(&fs::read_to_string(path)?))
    }
}

pub fn parse_tree(src: &str) -> Node {
    let lines: Vec<(usize, &str, usize)> = src
        .lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                return None;
            }
            let indent = raw.len() - raw.trim_start().len();
            Some((indent, text, i + 1))
        })
        .collect();
    let mut idx = 0;
    Node::section("", build(&lines, &mut idx, 0))
}

fn build(lines: &[(usize, &str, usize)], idx: &mut usize, indent: usize) -> Vec<Node> {
    let mut out = Vec::new();
    while let Some(&(ind, text, lineno)) = lines.get(*idx) {
        if ind < indent {
            break;
        }
        *idx += 1;
        match text.strip_suffix(':') {
            Some(name) => {
                let children = match lines.get(*idx) {
                    Some(&(next, _, _)) if next > ind => build(lines, idx, next),
                    _ => Vec::new(),
                };
                out.push(Node::section(name, children).at(lineno));
            }
            None => out.push(Node::line(text).at(lineno)),
        }
    }
    out
}

// ── Grammar ───────────────────────────────────────────────────────────────────

/// Knows `join`, `quit` (unless disabled) and the self-managing `every`.
///
/// Statements starting with `delay` suspend, anything starting with `bad`
/// fails.  Every parse call is counted.
pub struct TestGrammar {
    pub calls: AtomicUsize,
    pub knows_quit: AtomicBool,
    pub timers: Arc<Timers>,
}

impl TestGrammar {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            knows_quit: AtomicBool::new(true),
            timers: Arc::new(Timers::default()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Grammar for TestGrammar {
    fn parse_event(
        &self,
        text: &str,
        _ctx: &CompileContext,
    ) -> Result<(Arc<EventInfo>, EventSpec), String> {
        self.count();
        let kind = text.split_whitespace().next().unwrap_or("");
        let info = self.event_info(kind).ok_or_else(String::new)?;
        Ok((info, EventSpec::new(kind, text)))
    }

    fn event_info(&self, kind: &str) -> Option<Arc<EventInfo>> {
        match kind {
            "join" => Some(Arc::new(EventInfo::dispatched(
                "join",
                vec![EventType::new("PlayerJoin")],
            ))),
            "quit" if self.knows_quit.load(Ordering::SeqCst) => Some(Arc::new(
                EventInfo::dispatched("quit", vec![EventType::new("PlayerQuit"), EventType::new("PlayerKick")]),
            )),
            "every" => Some(Arc::new(EventInfo::self_managed("every", self.timers.clone()))),
            _ => None,
        }
    }

    fn parse_condition(&self, text: &str, _ctx: &CompileContext) -> Result<Condition, String> {
        self.count();
        if text.starts_with("bad") {
            return Err(String::new());
        }
        Ok(Condition::new(text))
    }

    fn parse_expression(
        &self,
        text: &str,
        _expected: &str,
        _ctx: &CompileContext,
    ) -> Result<Expression, String> {
        self.count();
        Ok(Expression::new(text, !text.starts_with("all ")))
    }

    fn parse_statement(&self, text: &str, _ctx: &CompileContext) -> Result<Statement, String> {
        self.count();
        if text.starts_with("bad") {
            Err(String::new())
        } else if text.starts_with("delay") {
            Ok(Statement::suspending(text))
        } else {
            Ok(Statement::new(text))
        }
    }
}

#[derive(Default)]
pub struct Timers {
    pub active: Mutex<Vec<String>>,
}

impl SelfRegistering for Timers {
    fn register(&self, trigger: &Arc<Trigger>) {
        self.active.lock().unwrap().push(trigger.name.clone());
    }

    fn unregister(&self, trigger: &Trigger) {
        let mut active = self.active.lock().unwrap();
        if let Some(pos) = active.iter().position(|n| *n == trigger.name) {
            active.remove(pos);
        }
    }
}

// ── Commands & host ───────────────────────────────────────────────────────────

/// Registers commands by name; refuses names listed in `refuse`.
#[derive(Default)]
pub struct TestCommands {
    pub registered: Mutex<Vec<(String, Option<PathBuf>)>>,
    pub refuse: Mutex<HashSet<String>>,
}

impl TestCommands {
    pub fn names(&self) -> Vec<String> {
        self.registered
            .lock()
            .unwrap()
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }
}

impl CommandCompiler for TestCommands {
    fn compile_command(&self, section: &Node, ctx: &mut CompileContext) -> Result<Command, String> {
        let name = section.name()["command ".len()..].trim().to_owned();
        let command = Command::new(name, ctx.file.clone());
        self.register_command(&Arc::new(command.clone()))?;
        Ok(command)
    }

    fn register_command(&self, command: &Arc<Command>) -> Result<(), String> {
        if self.refuse.lock().unwrap().contains(&command.name) {
            return Err("refused".into());
        }
        self.registered
            .lock()
            .unwrap()
            .push((command.name.clone(), command.file.clone()));
        Ok(())
    }

    fn unregister_commands(&self, file: &Path) -> usize {
        let mut registered = self.registered.lock().unwrap();
        let before = registered.len();
        registered.retain(|(_, f)| f.as_deref() != Some(file));
        before - registered.len()
    }
}

#[derive(Default)]
pub struct RecordingHost {
    pub subscribed: Mutex<Vec<EventType>>,
}

impl EventHost for RecordingHost {
    fn subscribe(&self, event_type: &EventType) {
        self.subscribed.lock().unwrap().push(event_type.clone());
    }
}

// ── Fixture ───────────────────────────────────────────────────────────────────

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub grammar: Arc<TestGrammar>,
    pub commands: Arc<TestCommands>,
    pub host: Arc<RecordingHost>,
    pub loader: ScriptLoader,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut LoaderConfig)) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let grammar = Arc::new(TestGrammar::new());
        let commands = Arc::new(TestCommands::default());
        let host = Arc::new(RecordingHost::default());
        let mut config = LoaderConfig {
            scripts_dir: dir.path().join("scripts"),
            ..LoaderConfig::default()
        };
        tweak(&mut config);
        let loader = Self::loader_with(config, grammar.clone(), commands.clone(), host.clone());
        Self {
            dir,
            grammar,
            commands,
            host,
            loader,
        }
    }

    pub fn loader_with(
        config: LoaderConfig,
        grammar: Arc<TestGrammar>,
        commands: Arc<TestCommands>,
        host: Arc<RecordingHost>,
    ) -> ScriptLoader {
        let services = Services::new(grammar, Arc::new(IndentReader))
            .with_commands(commands)
            .with_host(host);
        ScriptLoader::new(config, services)
    }

    pub fn scripts(&self) -> PathBuf {
        self.dir.path().join("scripts")
    }

    /// Write a script under the scripts directory and return its path.
    pub fn write(&self, rel: &str, src: &str) -> PathBuf {
        let path = self.scripts().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, src).unwrap();
        path
    }

    pub fn artifact(&self, script: &Path) -> PathBuf {
        self.loader.cache().path_for(script)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.host
            .subscribed
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.to_string())
            .collect()
    }
}

/// Set `path`'s modification time to `secs` after the epoch.
pub fn set_mtime(path: &Path, secs: u64) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}
