//! Command registration and dispatch.
//!
//! [`CommandService`] owns the command trie, the type readers and the
//! executor. The trie sits behind a read-write lock; a dispatch snapshots its
//! candidates under the read lock and releases it before running any check,
//! so registration never waits on a slow precondition.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use crate::command::{Command, CommandId, NamePath};
use crate::config::DispatchConfig;
use crate::context::CommandContext;
use crate::error::{ConfigError, DispatchError, RegistrationError, TrieError};
use crate::executor::{CommandExecutor, ExecutionResult, format_usage};
use crate::matcher::{
    CandidateEvaluator, CandidateFailure, MatchCandidate, MatchStage, best_failure, best_match,
};
use crate::reader::{TypeReader, TypeReaderRegistry};
use crate::swap::{create_swappers, validate_swappable};
use crate::tokenizer::{TokenizerOptions, tokenize};
use crate::trie::{CommandTrie, NodeKey, TrieCursor};

/// A successful match, ready to execute.
#[derive(Debug, Clone)]
pub struct CommandMatch {
    /// The declared command.
    pub command: Arc<Command>,
    /// The trie entry that matched; a swapped variant when the arguments
    /// were given out of order.
    pub matched: Arc<Command>,
    /// Converted arguments in declaration order.
    pub arguments: Vec<Value>,
    /// Input tokens consumed by the command path.
    pub consumed_path_length: usize,
    /// Parameters filled from their default.
    pub defaulted: usize,
}

/// The furthest-progressing failed candidate.
#[derive(Debug, Clone)]
pub struct CandidateReport {
    /// The declared command.
    pub command: Arc<Command>,
    /// Stage at which it stopped.
    pub stage: MatchStage,
    /// Why it stopped.
    pub failure: CandidateFailure,
}

/// No candidate passed every stage.
#[derive(Debug, Clone, Default)]
pub struct NoMatchFound {
    /// Explanation from the candidate that got furthest; `None` when the
    /// input matched no command path at all.
    pub best: Option<CandidateReport>,
    /// Commands under the deepest matched path, for "did you mean" hints.
    pub suggestions: Vec<Arc<Command>>,
}

impl fmt::Display for NoMatchFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.best {
            Some(report) => write!(f, "{}: {}", report.command.name(), report.failure)?,
            None => f.write_str("unknown command")?,
        }
        if !self.suggestions.is_empty() {
            let usages = self.suggestions.iter().map(|c| format_usage(c)).join(", ");
            write!(f, " (did you mean: {usages})")?;
        }
        Ok(())
    }
}

impl std::error::Error for NoMatchFound {}

/// Result of [`CommandService::find_match`].
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched(CommandMatch),
    NoMatch(NoMatchFound),
}

/// Result of [`CommandService::dispatch`].
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The winning command ran.
    Executed {
        command: Arc<Command>,
        result: ExecutionResult,
    },
    /// Nothing ran.
    NoMatch(NoMatchFound),
}

impl DispatchOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed { .. })
    }
}

#[derive(Debug, Default)]
struct Registry {
    trie: CommandTrie,
    // declared command -> its swapped variants
    variants: HashMap<CommandId, Vec<Arc<Command>>>,
}

struct Snapshot {
    candidates: Vec<MatchCandidate>,
    suggestions: Vec<Arc<Command>>,
    version: u64,
}

/// Registry plus dispatcher for text commands.
pub struct CommandService {
    config: DispatchConfig,
    tokenizer: TokenizerOptions,
    registry: RwLock<Registry>,
    readers: RwLock<TypeReaderRegistry>,
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for CommandService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandService")
            .field("config", &self.config)
            .field("commands", &self.registry.read().trie.len())
            .field("readers", &*self.readers.read())
            .finish_non_exhaustive()
    }
}

impl CommandService {
    /// Create a service after validating `config`.
    pub fn new(
        config: DispatchConfig,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            tokenizer: TokenizerOptions::from(&config),
            registry: RwLock::new(Registry {
                trie: CommandTrie::new(config.name_comparer),
                variants: HashMap::new(),
            }),
            readers: RwLock::new(TypeReaderRegistry::new()),
            executor,
            config,
        })
    }

    /// Create a service with the default configuration.
    pub fn with_executor(executor: Arc<dyn CommandExecutor>) -> Self {
        let config = DispatchConfig::default();
        Self {
            tokenizer: TokenizerOptions::from(&config),
            registry: RwLock::new(Registry::default()),
            readers: RwLock::new(TypeReaderRegistry::new()),
            executor,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Add or replace the reader for `type_name`.
    pub fn register_reader(&self, type_name: impl Into<String>, reader: Arc<dyn TypeReader>) {
        let type_name = type_name.into();
        debug!("Registered type reader for {}", type_name);
        self.readers.write().register(type_name, reader);
    }

    /// Register a command together with its swapped-argument variants.
    ///
    /// Registering a command that is already a member is a no-op.
    pub fn register(
        &self,
        command: impl Into<Arc<Command>>,
    ) -> Result<Arc<Command>, RegistrationError> {
        let command = command.into();
        if command.is_variant() {
            return Err(RegistrationError::InvalidCommand {
                command: command.name(),
                reason: "swapped variants cannot be registered directly".to_string(),
            });
        }
        validate_swappable(&command.name(), command.parameters(), command.swappable())?;

        let penalty = self.config.swap_priority_penalty;
        let variants: Vec<Arc<Command>> = create_swappers(command.swappable())
            .into_iter()
            .map(|swapper| Arc::new(Command::swap_variant(&command, Arc::new(swapper), penalty)))
            .collect();

        let mut guard = self.registry.write();
        let registry = &mut *guard;
        if !registry.trie.insert(Arc::clone(&command)) {
            debug!("Command {} is already registered", command.name());
            return Ok(command);
        }
        for variant in &variants {
            registry.trie.insert(Arc::clone(variant));
        }

        info!(
            "Registered command {} ({} paths, {} swapped variants)",
            command.name(),
            command.name_paths().len(),
            variants.len()
        );
        registry.variants.insert(command.id(), variants);
        Ok(command)
    }

    /// Register several commands, stopping at the first invalid one.
    pub fn register_all<I, C>(&self, commands: I) -> Result<Vec<Arc<Command>>, RegistrationError>
    where
        I: IntoIterator<Item = C>,
        C: Into<Arc<Command>>,
    {
        commands.into_iter().map(|c| self.register(c)).collect()
    }

    /// Remove a command and its variants from every path.
    ///
    /// Returns `false` if it was not registered.
    pub fn unregister(&self, command: &Command) -> bool {
        let mut guard = self.registry.write();
        let registry = &mut *guard;
        if !registry.trie.remove(command) {
            return false;
        }
        let variants = registry.variants.remove(&command.id()).unwrap_or_default();
        for variant in &variants {
            registry.trie.remove(variant);
        }
        info!(
            "Unregistered command {} ({} swapped variants)",
            command.name(),
            variants.len()
        );
        true
    }

    /// Declared commands in registration order.
    pub fn commands(&self) -> Vec<Arc<Command>> {
        self.registry
            .read()
            .trie
            .iter()
            .filter(|c| !c.is_variant())
            .cloned()
            .collect()
    }

    /// Number of declared commands.
    pub fn len(&self) -> usize {
        self.registry.read().trie.iter().filter(|c| !c.is_variant()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Declared commands registered exactly under `path`.
    pub fn find_commands(&self, path: impl Into<NamePath>) -> Vec<Arc<Command>> {
        let path = path.into();
        let registry = self.registry.read();
        let Some(node) = registry.trie.descend(path.segments()) else {
            return Vec::new();
        };
        registry
            .trie
            .items(node)
            .filter(|c| !c.is_variant())
            .cloned()
            .collect()
    }

    /// Enable or disable a command at runtime. Its variants follow.
    ///
    /// Returns `false` for an unknown id.
    pub fn set_enabled(&self, id: CommandId, enabled: bool) -> bool {
        let registry = self.registry.read();
        let Some(command) = registry.trie.get(id) else {
            return false;
        };
        command.source().set_enabled(enabled);
        debug!(
            "Command {} {}",
            command.name(),
            if enabled { "enabled" } else { "disabled" }
        );
        true
    }

    /// Start a fail-fast iteration over the declared commands; advance it with
    /// [`CommandService::next_command`].
    pub fn cursor(&self) -> TrieCursor {
        self.registry.read().trie.cursor()
    }

    /// Advance `cursor`, skipping swapped variants.
    ///
    /// Fails with [`TrieError::ConcurrentModification`] if a command was
    /// registered or removed since the cursor was created.
    pub fn next_command(&self, cursor: &mut TrieCursor) -> Option<Result<Arc<Command>, TrieError>> {
        let registry = self.registry.read();
        loop {
            match cursor.next(&registry.trie)? {
                Ok(command) if command.is_variant() => continue,
                other => return Some(other),
            }
        }
    }

    /// Commands under the deepest path `input` reaches, or under the edges
    /// its next word is a prefix of.
    pub fn suggest(&self, input: &str) -> Result<Vec<Arc<Command>>, DispatchError> {
        let tokens = tokenize(input, &self.tokenizer)?;
        let registry = self.registry.read();
        let (node, depth) = walk(&registry.trie, &tokens);
        Ok(self.suggestions(&registry.trie, node, depth, &tokens, &HashSet::new()))
    }

    /// Resolve `input` to the best command without executing it.
    pub async fn find_match(
        &self,
        input: &str,
        context: &CommandContext,
    ) -> Result<MatchOutcome, DispatchError> {
        self.resolve(input, context)
            .await
            .map(|(outcome, _)| outcome)
    }

    /// Resolve `input` and run the winner through the executor.
    ///
    /// A candidate that does not fit is never an error; the caller gets
    /// [`DispatchOutcome::NoMatch`] explaining the best failure. Errors are
    /// reserved for unbalanced quotes and for the winner being unregistered
    /// while its checks were running.
    pub async fn dispatch(
        &self,
        input: &str,
        context: &CommandContext,
    ) -> Result<DispatchOutcome, DispatchError> {
        let (outcome, version) = self.resolve(input, context).await?;
        let found = match outcome {
            MatchOutcome::Matched(found) => found,
            MatchOutcome::NoMatch(no_match) => {
                debug!("No command matched {:?}: {}", input, no_match);
                return Ok(DispatchOutcome::NoMatch(no_match));
            }
        };

        {
            let registry = self.registry.read();
            let current = registry.trie.version();
            if current != version && !registry.trie.contains(found.matched.id()) {
                return Err(TrieError::ConcurrentModification {
                    expected: version,
                    found: current,
                }
                .into());
            }
        }

        debug!(
            "Dispatching {} with {} arguments",
            found.command.name(),
            found.arguments.len()
        );
        let result = self
            .executor
            .execute(&found.command, found.arguments, context)
            .await;
        if let ExecutionResult::Failed { reason } = &result {
            debug!("Command {} failed: {}", found.command.name(), reason);
        }

        Ok(DispatchOutcome::Executed {
            command: found.command,
            result,
        })
    }

    async fn resolve(
        &self,
        input: &str,
        context: &CommandContext,
    ) -> Result<(MatchOutcome, u64), DispatchError> {
        let tokens = tokenize(input, &self.tokenizer)?;
        let snapshot = self.snapshot(&tokens);
        let readers = self.readers.read().clone();

        let evaluator = CandidateEvaluator {
            readers: &readers,
            separator: self.config.separator,
            ignore_extra_arguments: self.config.ignore_extra_arguments,
        };
        let mut evaluated = Vec::with_capacity(snapshot.candidates.len());
        for candidate in snapshot.candidates {
            evaluated.push(evaluator.evaluate(candidate, context).await);
        }

        if let Some(winner) = best_match(&evaluated) {
            let found = CommandMatch {
                command: winner.command.source_arc(),
                matched: Arc::clone(&winner.command),
                arguments: winner.command.restore_order(winner.arguments.clone()),
                consumed_path_length: winner.consumed_path_length,
                defaulted: winner.defaulted,
            };
            return Ok((MatchOutcome::Matched(found), snapshot.version));
        }

        let best = best_failure(&evaluated).and_then(|candidate| {
            Some(CandidateReport {
                command: candidate.command.source_arc(),
                stage: candidate.stage,
                failure: candidate.failure.clone()?,
            })
        });
        let no_match = NoMatchFound {
            best,
            suggestions: snapshot.suggestions,
        };
        Ok((MatchOutcome::NoMatch(no_match), snapshot.version))
    }

    fn snapshot(&self, tokens: &[String]) -> Snapshot {
        let registry = self.registry.read();
        let trie = &registry.trie;

        let mut candidates = Vec::new();
        let mut node = trie.root();
        for (depth, token) in tokens.iter().enumerate() {
            let Some(child) = trie.child(node, token) else {
                break;
            };
            node = child;
            let consumed = depth + 1;
            for command in trie.items(node) {
                let order = trie
                    .position(command.source().id())
                    .unwrap_or(usize::MAX);
                candidates.push(MatchCandidate::new(
                    Arc::clone(command),
                    consumed,
                    tokens[consumed..].to_vec(),
                    order,
                ));
            }
        }

        let suggestions = if self.config.suggest_partial_paths {
            let (node, depth) = walk(trie, tokens);
            let excluded: HashSet<CommandId> = candidates
                .iter()
                .map(|c| c.command.source().id())
                .collect();
            self.suggestions(trie, node, depth, tokens, &excluded)
        } else {
            Vec::new()
        };

        Snapshot {
            candidates,
            suggestions,
            version: trie.version(),
        }
    }

    fn suggestions(
        &self,
        trie: &CommandTrie,
        node: NodeKey,
        depth: usize,
        tokens: &[String],
        excluded: &HashSet<CommandId>,
    ) -> Vec<Arc<Command>> {
        let mut roots: Vec<(&str, NodeKey)> = match tokens.get(depth) {
            Some(next) => {
                let prefix = self.config.name_comparer.normalize(next);
                trie.edges(node)
                    .filter(|(label, _)| label.starts_with(prefix.as_ref()))
                    .collect()
            }
            None => Vec::new(),
        };
        roots.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let roots: Vec<NodeKey> = if !roots.is_empty() {
            roots.into_iter().map(|(_, key)| key).collect()
        } else if depth > 0 {
            vec![node]
        } else {
            Vec::new()
        };

        roots
            .into_iter()
            .flat_map(|root| trie.collect(root, true))
            .filter(|c| !c.is_variant() && !excluded.contains(&c.id()))
            .unique_by(|c| c.id())
            .take(self.config.max_suggestions)
            .collect()
    }
}

/// Deepest node reachable along `tokens` and the number of tokens consumed.
fn walk(trie: &CommandTrie, tokens: &[String]) -> (NodeKey, usize) {
    let mut node = trie.root();
    let mut depth = 0;
    for token in tokens {
        match trie.child(node, token) {
            Some(child) => {
                node = child;
                depth += 1;
            }
            None => break,
        }
    }
    (node, depth)
}
