//! End-to-end dispatch scenarios.
//!
//! Covers:
//! 1. Candidate ranking
//! 2. Failure reporting and suggestions
//! 3. Swapped-argument variants
//! 4. Registration and runtime toggles
//! 5. Hard errors

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use super::*;

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl Recorder {
    fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CommandExecutor for Recorder {
    async fn execute(
        &self,
        command: &Arc<Command>,
        arguments: Vec<Value>,
        _context: &CommandContext,
    ) -> ExecutionResult {
        assert!(!command.is_variant(), "handlers must see the declared command");
        self.calls.lock().push((command.name(), arguments));
        ExecutionResult::success()
    }
}

fn service() -> (CommandService, Arc<Recorder>) {
    service_with(DispatchConfig::default())
}

fn service_with(config: DispatchConfig) -> (CommandService, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let service = CommandService::new(config, Arc::clone(&recorder) as Arc<dyn CommandExecutor>)
        .unwrap();
    (service, recorder)
}

async fn run(service: &CommandService, input: &str) -> DispatchOutcome {
    run_in(service, input, &CommandContext::default()).await
}

async fn run_in(service: &CommandService, input: &str, context: &CommandContext) -> DispatchOutcome {
    service.dispatch(input, context).await.unwrap()
}

fn no_match(outcome: DispatchOutcome) -> NoMatchFound {
    match outcome {
        DispatchOutcome::NoMatch(no_match) => no_match,
        other => panic!("expected no match, got {other:?}"),
    }
}

fn names(commands: &[Arc<Command>]) -> Vec<String> {
    commands.iter().map(|c| c.name()).collect()
}

// ============================================================================
// Ranking Tests
// ============================================================================

mod ranking_tests {
    use super::*;

    fn tag_commands(tag_priority: i32) -> Vec<Command> {
        vec![
            Command::builder("tag")
                .priority(tag_priority)
                .parameter(Parameter::new("text", "string").remainder())
                .build()
                .unwrap(),
            Command::builder("tag create")
                .parameter(Parameter::new("name", "string"))
                .build()
                .unwrap(),
        ]
    }

    #[tokio::test]
    async fn test_longer_path_wins_at_equal_priority() {
        let (service, recorder) = service();
        service.register_all(tag_commands(0)).unwrap();

        assert!(run(&service, "tag create foo").await.is_executed());
        assert_eq!(recorder.calls(), vec![("tag create".to_string(), vec![json!("foo")])]);
    }

    #[tokio::test]
    async fn test_priority_beats_path_length() {
        let (service, recorder) = service();
        service.register_all(tag_commands(1)).unwrap();

        run(&service, "tag create foo").await;
        assert_eq!(
            recorder.calls(),
            vec![("tag".to_string(), vec![json!("create foo")])]
        );
    }

    #[tokio::test]
    async fn test_fewer_defaults_beat_registration_order() {
        let (service, recorder) = service();
        service
            .register(
                Command::builder("roll")
                    .description("three parameters")
                    .parameter(Parameter::new("sides", "int"))
                    .parameter(Parameter::new("times", "int").optional(json!(1)))
                    .parameter(Parameter::new("label", "string").optional(json!("")))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        service
            .register(
                Command::builder("roll")
                    .description("two parameters")
                    .parameter(Parameter::new("sides", "int"))
                    .parameter(Parameter::new("times", "int").optional(json!(1)))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let outcome = service
            .find_match("roll 20", &CommandContext::default())
            .await
            .unwrap();
        let MatchOutcome::Matched(found) = outcome else {
            panic!("expected a match");
        };
        assert_eq!(found.command.description(), Some("two parameters"));
        assert_eq!(found.arguments, vec![json!(20), json!(1)]);
        assert_eq!(found.defaulted, 1);
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_earlier_registration_breaks_full_ties() {
        let (service, _) = service();
        let first = service
            .register(Command::builder("ping").description("first").build().unwrap())
            .unwrap();
        service
            .register(Command::builder("ping").description("second").build().unwrap())
            .unwrap();

        let outcome = service.find_match("ping", &CommandContext::default()).await.unwrap();
        let MatchOutcome::Matched(found) = outcome else {
            panic!("expected a match");
        };
        assert_eq!(found.command.id(), first.id());
    }

    #[tokio::test]
    async fn test_aliases_and_case_insensitivity() {
        let (service, recorder) = service();
        service
            .register(
                Command::builder("tag create")
                    .alias("t c")
                    .parameter(Parameter::new("name", "string"))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        run(&service, "TAG Create one").await;
        run(&service, "t c two").await;
        assert_eq!(
            recorder.calls(),
            vec![
                ("tag create".to_string(), vec![json!("one")]),
                ("tag create".to_string(), vec![json!("two")]),
            ]
        );
    }

    #[tokio::test]
    async fn test_case_sensitive_comparer() {
        let (service, _) = service_with(DispatchConfig {
            name_comparer: NameComparer::CaseSensitive,
            ..Default::default()
        });
        service.register(Command::builder("Ping").build().unwrap()).unwrap();

        assert!(run(&service, "Ping").await.is_executed());
        assert!(!run(&service, "ping").await.is_executed());
    }
}

// ============================================================================
// Argument Binding Tests
// ============================================================================

mod binding_tests {
    use super::*;

    #[tokio::test]
    async fn test_scalar_remainder_receives_rejoined_tokens() {
        let (service, recorder) = service();
        service
            .register(
                Command::builder("say")
                    .parameter(Parameter::new("text", "string").remainder())
                    .build()
                    .unwrap(),
            )
            .unwrap();

        run(&service, "say hello   big world").await;
        run(&service, r#"say "a  b" c"#).await;
        assert_eq!(
            recorder.calls(),
            vec![
                ("say".to_string(), vec![json!("hello big world")]),
                ("say".to_string(), vec![json!("a  b c")]),
            ]
        );
    }

    #[tokio::test]
    async fn test_collection_remainder_converts_each_token() {
        let (service, recorder) = service();
        service
            .register(
                Command::builder("sum")
                    .parameter(Parameter::new("values", "int").remainder().collection())
                    .build()
                    .unwrap(),
            )
            .unwrap();

        run(&service, "sum 1 2 3").await;
        assert_eq!(recorder.calls(), vec![("sum".to_string(), vec![json!([1, 2, 3])])]);

        let failure = no_match(run(&service, "sum 1 two").await);
        assert_eq!(failure.best.unwrap().stage, MatchStage::Conversion);
    }

    #[tokio::test]
    async fn test_extra_arguments_rejected_by_default() {
        let (service, _) = service();
        service.register(Command::builder("ping").build().unwrap()).unwrap();

        let failure = no_match(run(&service, "ping extra").await);
        assert_eq!(
            failure.best.unwrap().failure,
            CandidateFailure::ArityMismatch {
                min: 0,
                max: Some(0),
                actual: 1
            }
        );
    }

    #[tokio::test]
    async fn test_extra_arguments_ignored_when_configured() {
        let (service, recorder) = service_with(DispatchConfig {
            ignore_extra_arguments: true,
            ..Default::default()
        });
        service.register(Command::builder("ping").build().unwrap()).unwrap();

        assert!(run(&service, "ping extra words").await.is_executed());
        assert_eq!(recorder.calls(), vec![("ping".to_string(), vec![])]);
    }

    #[tokio::test]
    async fn test_custom_reader() {
        struct ColorReader;

        #[async_trait]
        impl TypeReader for ColorReader {
            async fn read(
                &self,
                input: &str,
                _: &Parameter,
                _: &CommandContext,
            ) -> Result<Value, String> {
                match input {
                    "red" | "green" | "blue" => Ok(json!(input)),
                    other => Err(format!("unknown color `{other}`")),
                }
            }
        }

        let (service, recorder) = service();
        service.register_reader("color", Arc::new(ColorReader));
        service
            .register(
                Command::builder("paint")
                    .parameter(Parameter::new("color", "color"))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        assert!(run(&service, "paint red").await.is_executed());
        let failure = no_match(run(&service, "paint mauve").await);
        assert_eq!(
            failure.best.unwrap().failure,
            CandidateFailure::ConversionFailed {
                parameter: "color".to_string(),
                reason: "unknown color `mauve`".to_string(),
            }
        );
        assert_eq!(recorder.calls().len(), 1);
    }
}

// ============================================================================
// Failure Reporting Tests
// ============================================================================

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_best_failure_is_furthest_stage() {
        let (service, recorder) = service();
        service
            .register(
                Command::builder("ban")
                    .context(ContextConstraint::kinds(["direct"]))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        service
            .register(
                Command::builder("ban")
                    .parameter(Parameter::new("user", "int"))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let context = CommandContext::new("guild");
        let failure = no_match(run_in(&service, "ban abc", &context).await);
        let report = failure.best.unwrap();
        assert_eq!(report.stage, MatchStage::Conversion);
        assert!(matches!(
            report.failure,
            CandidateFailure::ConversionFailed { ref parameter, .. } if parameter == "user"
        ));
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_equal_stage_reports_earlier_registration() {
        let (service, _) = service();
        let first = service
            .register(
                Command::builder("add")
                    .parameter(Parameter::new("a", "int"))
                    .parameter(Parameter::new("b", "int"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        service
            .register(
                Command::builder("add")
                    .parameter(Parameter::new("a", "float"))
                    .parameter(Parameter::new("b", "float"))
                    .parameter(Parameter::new("c", "float"))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let failure = no_match(run(&service, "add 1").await);
        let report = failure.best.unwrap();
        assert_eq!(report.stage, MatchStage::Arity);
        assert_eq!(report.command.id(), first.id());
    }

    #[tokio::test]
    async fn test_context_constraint() {
        let (service, recorder) = service();
        service
            .register(
                Command::builder("kick")
                    .context(ContextConstraint::kinds(["guild"]))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let failure = no_match(run_in(&service, "kick", &CommandContext::new("direct")).await);
        assert_eq!(
            failure.best.unwrap().failure,
            CandidateFailure::InvalidContext {
                required: vec!["guild".to_string()],
                actual: "direct".to_string(),
            }
        );

        assert!(run_in(&service, "kick", &CommandContext::new("guild")).await.is_executed());
        assert_eq!(recorder.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_grouped_preconditions() {
        let role_is = |role: &'static str| {
            move |_: &Command, context: &CommandContext| {
                if context.property("role") == Some(role) {
                    Ok(())
                } else {
                    Err(CheckFailure::new(format!("requires {role}")))
                }
            }
        };

        let (service, recorder) = service();
        service
            .register(
                Command::builder("purge")
                    .precondition(precondition_fn(CheckGroup::or("staff"), role_is("owner")))
                    .precondition(precondition_fn(CheckGroup::or("staff"), role_is("admin")))
                    .precondition(precondition_fn(CheckGroup::ungrouped(), |_, context| {
                        if context.property("banned").is_some() {
                            Err(CheckFailure::new("invoker is banned"))
                        } else {
                            Ok(())
                        }
                    }))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let admin = CommandContext::new("guild").with_property("role", "admin");
        assert!(run_in(&service, "purge", &admin).await.is_executed());

        let guest = CommandContext::new("guild").with_property("role", "guest");
        let failure = no_match(run_in(&service, "purge", &guest).await);
        assert_eq!(
            failure.best.unwrap().failure,
            CandidateFailure::PreconditionFailed {
                reason: "requires admin".to_string()
            }
        );

        let banned_admin = admin.clone().with_property("banned", "yes");
        let failure = no_match(run_in(&service, "purge", &banned_admin).await);
        assert_eq!(
            failure.best.unwrap().failure.to_string(),
            "invoker is banned"
        );

        assert_eq!(recorder.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_command_has_no_report() {
        let (service, _) = service();
        service.register(Command::builder("ping").build().unwrap()).unwrap();

        let failure = no_match(run(&service, "pong").await);
        assert!(failure.best.is_none());
        assert!(failure.suggestions.is_empty());
        assert_eq!(failure.to_string(), "unknown command");

        let failure = no_match(run(&service, "").await);
        assert!(failure.best.is_none());
    }
}

// ============================================================================
// Suggestion Tests
// ============================================================================

mod suggestion_tests {
    use super::*;

    fn tag_service() -> CommandService {
        let (service, _) = service();
        service
            .register_all([
                Command::builder("tag create")
                    .parameter(Parameter::new("name", "string"))
                    .build()
                    .unwrap(),
                Command::builder("tag delete")
                    .parameter(Parameter::new("name", "string"))
                    .build()
                    .unwrap(),
                Command::builder("tags list").build().unwrap(),
                Command::builder("ping").build().unwrap(),
            ])
            .unwrap();
        service
    }

    #[tokio::test]
    async fn test_partial_path_suggests_subtree() {
        let service = tag_service();

        let failure = no_match(run(&service, "tag").await);
        assert!(failure.best.is_none());
        assert_eq!(names(&failure.suggestions), ["tag create", "tag delete"]);
        assert_eq!(
            failure.to_string(),
            "unknown command (did you mean: tag create <name>, tag delete <name>)"
        );
    }

    #[tokio::test]
    async fn test_prefix_narrows_suggestions() {
        let service = tag_service();

        assert_eq!(names(&service.suggest("tag d").unwrap()), ["tag delete"]);
        assert_eq!(
            names(&service.suggest("ta").unwrap()),
            ["tag create", "tag delete", "tags list"]
        );
        assert!(service.suggest("zzz").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_candidates_are_not_suggested() {
        let (service, _) = service();
        service
            .register_all([
                Command::builder("tag")
                    .parameter(Parameter::new("name", "string"))
                    .build()
                    .unwrap(),
                Command::builder("tag create")
                    .parameter(Parameter::new("name", "string"))
                    .build()
                    .unwrap(),
            ])
            .unwrap();

        let failure = no_match(run(&service, "tag").await);
        assert_eq!(failure.best.unwrap().command.name(), "tag");
        assert_eq!(names(&failure.suggestions), ["tag create"]);
    }

    #[tokio::test]
    async fn test_suggestions_can_be_disabled_and_capped() {
        let (service, _) = service_with(DispatchConfig {
            suggest_partial_paths: false,
            ..Default::default()
        });
        service
            .register(Command::builder("tag create").build().unwrap())
            .unwrap();
        assert!(no_match(run(&service, "tag").await).suggestions.is_empty());

        let (service, _) = service_with(DispatchConfig {
            max_suggestions: 1,
            ..Default::default()
        });
        service
            .register_all([
                Command::builder("tag create").build().unwrap(),
                Command::builder("tag delete").build().unwrap(),
            ])
            .unwrap();
        assert_eq!(no_match(run(&service, "tag").await).suggestions.len(), 1);
    }
}

// ============================================================================
// Swapped Argument Tests
// ============================================================================

mod swap_tests {
    use super::*;

    fn give() -> Command {
        Command::builder("give")
            .parameter(Parameter::new("item", "string"))
            .parameter(Parameter::new("count", "int"))
            .swappable([0, 1])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_swapped_arguments_restore_declared_order() {
        let (service, recorder) = service();
        service.register(give()).unwrap();

        run(&service, "give apple 3").await;
        run(&service, "give 3 apple").await;
        assert_eq!(
            recorder.calls(),
            vec![
                ("give".to_string(), vec![json!("apple"), json!(3)]),
                ("give".to_string(), vec![json!("apple"), json!(3)]),
            ]
        );
    }

    #[tokio::test]
    async fn test_declared_order_wins_over_variant() {
        let (service, recorder) = service();
        service.register(give()).unwrap();

        let outcome = service
            .find_match("give 3 4", &CommandContext::default())
            .await
            .unwrap();
        let MatchOutcome::Matched(found) = outcome else {
            panic!("expected a match");
        };
        assert!(!found.matched.is_variant());
        assert_eq!(found.arguments, vec![json!("3"), json!(4)]);

        let outcome = service
            .find_match("give 3 apple", &CommandContext::default())
            .await
            .unwrap();
        let MatchOutcome::Matched(found) = outcome else {
            panic!("expected a match");
        };
        assert!(found.matched.is_variant());
        assert_eq!(found.matched.priority(), -1);
        assert!(!found.command.is_variant());
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unpenalized_variant_ranks_by_source_registration() {
        let (service, _) = service_with(DispatchConfig {
            swap_priority_penalty: 0,
            ..Default::default()
        });
        let first = service.register(give()).unwrap();
        let second = service
            .register(
                Command::builder("give")
                    .parameter(Parameter::new("count", "int"))
                    .parameter(Parameter::new("item", "string"))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        // Both the variant of `first` and `second` itself bind this input
        // with equal priority, path and defaults.
        let outcome = service
            .find_match("give 3 apple", &CommandContext::default())
            .await
            .unwrap();
        let MatchOutcome::Matched(found) = outcome else {
            panic!("expected a match");
        };
        assert!(found.matched.is_variant());
        assert_eq!(found.matched.priority(), 0);
        assert_eq!(found.command.id(), first.id());
        assert_ne!(found.command.id(), second.id());

        // A tie between a command and its own variant goes to the command.
        let outcome = service
            .find_match("give 3 4", &CommandContext::default())
            .await
            .unwrap();
        let MatchOutcome::Matched(found) = outcome else {
            panic!("expected a match");
        };
        assert!(!found.matched.is_variant());
        assert_eq!(found.command.id(), first.id());
        assert_eq!(found.arguments, vec![json!("3"), json!(4)]);
    }

    #[tokio::test]
    async fn test_three_way_swap() {
        let (service, recorder) = service();
        service
            .register(
                Command::builder("set")
                    .parameter(Parameter::new("name", "string"))
                    .parameter(Parameter::new("size", "int"))
                    .parameter(Parameter::new("visible", "bool"))
                    .swappable([0, 1, 2])
                    .build()
                    .unwrap(),
            )
            .unwrap();

        // Only "true" reads as a bool and only "5" as an int, so exactly
        // one ordering fits.
        run(&service, "set true 5 x").await;
        assert_eq!(
            recorder.calls(),
            vec![("set".to_string(), vec![json!("x"), json!(5), json!(true)])]
        );
    }

    #[tokio::test]
    async fn test_variants_are_hidden_from_listings() {
        let (service, _) = service();
        let give = service.register(give()).unwrap();

        assert_eq!(service.len(), 1);
        assert_eq!(names(&service.commands()), ["give"]);
        assert_eq!(service.find_commands("give").len(), 1);
        assert_eq!(service.find_commands("give")[0].id(), give.id());
    }

    #[tokio::test]
    async fn test_swapping_remainder_is_rejected() {
        let (service, _) = service();
        let result = service.register(
            Command::builder("note")
                .parameter(Parameter::new("title", "string"))
                .parameter(Parameter::new("body", "string").remainder())
                .swappable([0, 1])
                .build()
                .unwrap(),
        );

        assert!(matches!(
            result,
            Err(RegistrationError::SwapConfiguration { .. })
        ));
        assert!(service.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_removes_variants() {
        let (service, recorder) = service();
        let give = service.register(give()).unwrap();

        assert!(service.unregister(&give));
        assert!(!service.unregister(&give));
        assert!(service.is_empty());

        let failure = no_match(run(&service, "give 3 apple").await);
        assert!(failure.best.is_none());
        assert!(recorder.calls().is_empty());
    }
}

// ============================================================================
// Registration Tests
// ============================================================================

mod registration_tests {
    use super::*;

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let (service, _) = service();
        let ping = service.register(Command::builder("ping").build().unwrap()).unwrap();
        let again = service.register(Arc::clone(&ping)).unwrap();

        assert_eq!(ping.id(), again.id());
        assert_eq!(service.len(), 1);
    }

    #[tokio::test]
    async fn test_disable_and_enable() {
        let (service, recorder) = service();
        let ping = service.register(Command::builder("ping").build().unwrap()).unwrap();

        assert!(service.set_enabled(ping.id(), false));
        let failure = no_match(run(&service, "ping").await);
        assert_eq!(failure.best.unwrap().failure, CandidateFailure::Disabled);

        assert!(service.set_enabled(ping.id(), true));
        assert!(run(&service, "ping").await.is_executed());
        assert_eq!(recorder.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_disabling_source_disables_variants() {
        let (service, _) = service();
        let give = service
            .register(
                Command::builder("give")
                    .parameter(Parameter::new("item", "string"))
                    .parameter(Parameter::new("count", "int"))
                    .swappable([0, 1])
                    .build()
                    .unwrap(),
            )
            .unwrap();

        service.set_enabled(give.id(), false);
        let failure = no_match(run(&service, "give 3 apple").await);
        assert_eq!(failure.best.unwrap().stage, MatchStage::Enabled);
    }

    #[tokio::test]
    async fn test_set_enabled_unknown_id() {
        let (service, _) = service();
        let stray = Command::builder("stray").build().unwrap();
        assert!(!service.set_enabled(stray.id(), false));
    }

    #[tokio::test]
    async fn test_cursor_fails_after_registration() {
        let (service, _) = service();
        service
            .register_all([
                Command::builder("a").build().unwrap(),
                Command::builder("b").build().unwrap(),
            ])
            .unwrap();

        let mut cursor = service.cursor();
        assert_eq!(service.next_command(&mut cursor).unwrap().unwrap().name(), "a");

        service.register(Command::builder("c").build().unwrap()).unwrap();
        assert!(matches!(
            service.next_command(&mut cursor),
            Some(Err(TrieError::ConcurrentModification { .. }))
        ));
    }

    #[tokio::test]
    async fn test_cursor_skips_variants() {
        let (service, _) = service();
        service
            .register(
                Command::builder("give")
                    .parameter(Parameter::new("item", "string"))
                    .parameter(Parameter::new("count", "int"))
                    .swappable([0, 1])
                    .build()
                    .unwrap(),
            )
            .unwrap();
        service.register(Command::builder("ping").build().unwrap()).unwrap();

        let mut cursor = service.cursor();
        let mut seen = Vec::new();
        while let Some(command) = service.next_command(&mut cursor) {
            seen.push(command.unwrap().name());
        }
        assert_eq!(seen, ["give", "ping"]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DispatchConfig {
            separator: '"',
            ..Default::default()
        };
        let result = CommandService::new(config, executor_fn(|_, _, _| ExecutionResult::success()));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}

// ============================================================================
// Hard Error Tests
// ============================================================================

mod hard_error_tests {
    use super::*;

    #[tokio::test]
    async fn test_quote_mismatch_aborts_dispatch() {
        let (service, recorder) = service();
        service
            .register(
                Command::builder("say")
                    .parameter(Parameter::new("text", "string").remainder())
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let err = service
            .dispatch(r#"say "hello"#, &CommandContext::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Tokenize(TokenizeError::QuoteMismatch { .. })
        ));
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_winner_removed_during_dispatch() {
        let slot: Arc<OnceLock<Arc<CommandService>>> = Arc::new(OnceLock::new());
        let hook = Arc::clone(&slot);

        let recorder = Arc::new(Recorder::default());
        let service = Arc::new(CommandService::with_executor(
            Arc::clone(&recorder) as Arc<dyn CommandExecutor>
        ));
        let _ = slot.set(Arc::clone(&service));

        service
            .register(
                Command::builder("vanish")
                    .precondition(precondition_fn(CheckGroup::ungrouped(), move |command, _| {
                        if let Some(service) = hook.get() {
                            service.unregister(command);
                        }
                        Ok(())
                    }))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let err = service
            .dispatch("vanish", &CommandContext::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Trie(TrieError::ConcurrentModification { .. })
        ));
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_executor_failure_is_reported() {
        let service = CommandService::with_executor(executor_fn(|_, _, _| {
            ExecutionResult::failed("handler exploded")
        }));
        service.register(Command::builder("boom").build().unwrap()).unwrap();

        let outcome = run(&service, "boom").await;
        let DispatchOutcome::Executed { command, result } = outcome else {
            panic!("expected execution");
        };
        assert_eq!(command.name(), "boom");
        assert_eq!(result, ExecutionResult::failed("handler exploded"));
    }

    #[tokio::test]
    async fn test_prefixed_invocation() {
        let (service, recorder) = service();
        service.register(Command::builder("ping").build().unwrap()).unwrap();

        let line = "!ping";
        if let Some(rest) = strip_prefix(line, "!") {
            run(&service, rest).await;
        }
        assert!(strip_prefix("ping", "!").is_none());
        assert_eq!(recorder.calls().len(), 1);
    }
}
