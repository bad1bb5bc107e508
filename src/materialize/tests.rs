use super::*;
use crate::config::{ProgramList, SUPERVISORD, UNIX_HTTP_SERVER};
use crate::error::Error;

fn fields(pairs: &[(&str, FieldValue)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn options() -> MaterializeOptions {
    MaterializeOptions::new("/etc/procfleet")
}

fn group(programs: &str) -> GroupDefinition {
    GroupDefinition {
        programs: ProgramList::parse(programs),
        fields: FieldMap::new(),
    }
}

#[test]
fn test_numprocs_suffixes_instance_names() {
    let tree = ConfigTree::new().with_program(
        "web",
        fields(&[("command", "serve".into()), ("numprocs", FieldValue::Int(3))]),
    );

    let snapshot = materialize(&tree, &options()).unwrap();

    assert_eq!(snapshot.loaded_programs(), ["web_1", "web_2", "web_3"]);
    for (i, name) in ["web_1", "web_2", "web_3"].iter().enumerate() {
        let entry = snapshot.get(name).unwrap();
        assert_eq!(entry.name, format!("program:{name}"));
        assert_eq!(entry.get("process_name"), Some(*name));
        assert_eq!(entry.get("process_num"), Some((i + 1).to_string().as_str()));
        assert_eq!(entry.get("numprocs_start"), Some(i.to_string().as_str()));
    }
}

#[test]
fn test_single_instance_keeps_base_name() {
    let tree = ConfigTree::new().with_program("cat", fields(&[("command", "/bin/cat".into())]));

    let snapshot = materialize(&tree, &options()).unwrap();
    let entry = snapshot.get("cat").unwrap();

    assert_eq!(entry.name, "program:cat");
    assert_eq!(entry.get("process_num"), Some("1"));
    assert_eq!(entry.get("numprocs_start"), Some("0"));
    assert_eq!(entry.group.as_deref(), Some("cat"));
}

#[test]
fn test_unusable_numprocs_means_one_instance() {
    for numprocs in [FieldValue::Int(0), FieldValue::Int(-2), "many".into()] {
        let tree = ConfigTree::new().with_program(
            "w",
            fields(&[("command", "run".into()), ("numprocs", numprocs)]),
        );
        let snapshot = materialize(&tree, &options()).unwrap();
        assert_eq!(snapshot.loaded_programs(), ["w"]);
    }
}

#[test]
fn test_float_numprocs_is_truncated() {
    for numprocs in [FieldValue::Float(3.0), FieldValue::Float(3.7), "3.0".into()] {
        let tree = ConfigTree::new().with_program(
            "web",
            fields(&[("command", "run".into()), ("numprocs", numprocs)]),
        );
        let snapshot = materialize(&tree, &options()).unwrap();
        assert_eq!(snapshot.loaded_programs(), ["web_1", "web_2", "web_3"]);
    }
}

#[test]
fn test_large_numprocs_is_not_capped() {
    let count = LARGE_NUMPROCS + 1;
    let tree = ConfigTree::new().with_program(
        "burst",
        fields(&[
            ("command", "run".into()),
            ("numprocs", FieldValue::Int(count as i64)),
        ]),
    );
    let snapshot = materialize(&tree, &options()).unwrap();
    assert_eq!(snapshot.loaded_programs().len(), count);
    assert!(snapshot.get(&format!("burst_{count}")).is_some());
}

#[test]
fn test_null_fields_render_empty() {
    let tree = ConfigTree::from_yaml_str(
        "programs:\n  web:\n    command: run\n    numprocs: 3.0\n    stdout_logfile:\n",
    )
    .unwrap();
    let snapshot = materialize(&tree, &options()).unwrap();
    assert_eq!(snapshot.loaded_programs(), ["web_1", "web_2", "web_3"]);
    assert_eq!(snapshot.get("web_2").unwrap().get("stdout_logfile"), Some(""));
}

#[test]
fn test_numeric_string_numprocs() {
    let tree = ConfigTree::new().with_program(
        "w",
        fields(&[("command", "run".into()), ("numprocs", "2".into())]),
    );
    let snapshot = materialize(&tree, &options()).unwrap();
    assert_eq!(snapshot.loaded_programs(), ["w_1", "w_2"]);
}

#[test]
fn test_process_name_template_with_process_num() {
    let tree = ConfigTree::new().with_program(
        "web",
        fields(&[
            ("command", "serve".into()),
            ("numprocs", FieldValue::Int(2)),
            ("process_name", "%(program_name)s-%(process_num)02d".into()),
        ]),
    );

    let snapshot = materialize(&tree, &options()).unwrap();
    assert_eq!(snapshot.loaded_programs(), ["web-01", "web-02"]);
    assert_eq!(snapshot.get("web-02").unwrap().name, "program:web-02");
}

#[test]
fn test_single_instance_process_name_is_not_evaluated() {
    let tree = ConfigTree::new().with_program(
        "web",
        fields(&[
            ("command", "serve".into()),
            ("process_name", "web-%(process_num)d".into()),
        ]),
    );

    let snapshot = materialize(&tree, &options()).unwrap();
    assert_eq!(snapshot.loaded_programs(), ["web-%(process_num)d"]);
}

#[test]
fn test_default_fills_missing_fields_only() {
    let tree = ConfigTree::new()
        .with_program(
            DEFAULT_PROGRAM,
            fields(&[("autostart", "true".into()), ("startsecs", FieldValue::Int(5))]),
        )
        .with_program("worker", fields(&[("command", "run.sh".into())]))
        .with_program(
            "manual",
            fields(&[("command", "run.sh".into()), ("autostart", "false".into())]),
        );

    let snapshot = materialize(&tree, &options()).unwrap();

    let worker = snapshot.get("worker").unwrap();
    assert_eq!(worker.get("autostart"), Some("true"));
    assert_eq!(worker.get("startsecs"), Some("5"));

    let manual = snapshot.get("manual").unwrap();
    assert_eq!(manual.get("autostart"), Some("false"));
}

#[test]
fn test_default_is_never_instantiated() {
    let tree = ConfigTree::new().with_program(DEFAULT_PROGRAM, fields(&[("command", "x".into())]));

    let snapshot = materialize(&tree, &options()).unwrap();
    assert!(snapshot.loaded_programs().is_empty());
    assert!(snapshot.entries().is_empty());
}

#[test]
fn test_command_tokens_per_instance() {
    let tree = ConfigTree::new().with_program(
        "app",
        fields(&[
            ("command", "%(program_name)s --id=%(process_num)d".into()),
            ("numprocs", FieldValue::Int(2)),
        ]),
    );

    let snapshot = materialize(&tree, &options()).unwrap();
    assert_eq!(
        snapshot.get("app_1").unwrap().get("command"),
        Some("app --id=1")
    );
    assert_eq!(
        snapshot.get("app_2").unwrap().get("command"),
        Some("app --id=2")
    );
}

#[test]
fn test_here_group_and_host_tokens() {
    let tree = ConfigTree::new()
        .with_group("webapp", group("api"))
        .with_program(
            "api",
            fields(&[
                (
                    "command",
                    "%(here)s/bin/api --group=%(group_name)s --host=%(host_node_name)s".into(),
                ),
                ("directory", "%(here)s/run".into()),
                ("stdout_logfile", "/var/log/%(program_name)s.log".into()),
            ]),
        );
    let opts = options().with_host_node_name("node7");

    let snapshot = materialize(&tree, &opts).unwrap();
    let entry = snapshot.get("api").unwrap();

    assert_eq!(
        entry.get("command"),
        Some("/etc/procfleet/bin/api --group=webapp --host=node7")
    );
    assert_eq!(entry.get("directory"), Some("/etc/procfleet/run"));
    assert_eq!(entry.get("stdout_logfile"), Some("/var/log/api.log"));
    assert_eq!(entry.group.as_deref(), Some("webapp"));
}

#[test]
fn test_environment_tokens() {
    let tree = ConfigTree::new().with_program(
        "api",
        fields(&[("command", "%(ENV_HOME)s/api".into())]),
    );
    let opts = options().with_environment([("HOME", "/home/ops")]);

    let snapshot = materialize(&tree, &opts).unwrap();
    assert_eq!(snapshot.get("api").unwrap().get("command"), Some("/home/ops/api"));
}

#[test]
fn test_template_failure_skips_only_that_instance() {
    let tree = ConfigTree::new()
        .with_program("broken", fields(&[("command", "%(nope)s".into())]))
        .with_program("fine", fields(&[("command", "run".into())]));

    let snapshot = materialize(&tree, &options()).unwrap();

    assert_eq!(snapshot.loaded_programs(), ["fine"]);
    assert!(snapshot.get("broken").is_none());
    assert_eq!(snapshot.skipped().len(), 1);
    let skipped = &snapshot.skipped()[0];
    assert_eq!(skipped.program, "broken");
    assert_eq!(skipped.process_num, 1);
    assert!(skipped.reason.contains("nope"));
}

#[test]
fn test_process_name_failure_skips_instance() {
    let tree = ConfigTree::new().with_program(
        "web",
        fields(&[
            ("command", "serve".into()),
            ("numprocs", FieldValue::Int(2)),
            ("process_name", "%(process_num)d-%(missing)s".into()),
        ]),
    );

    let snapshot = materialize(&tree, &options()).unwrap();
    assert!(snapshot.loaded_programs().is_empty());
    assert_eq!(snapshot.skipped().len(), 2);
}

#[test]
fn test_group_registration_and_entry() {
    let tree = ConfigTree::new()
        .with_group("webapp", group("a, b , c"))
        .with_program("a", fields(&[("command", "run-a".into())]));

    let snapshot = materialize(&tree, &options()).unwrap();

    assert_eq!(snapshot.registry().programs("webapp"), ["a", "b", "c"]);
    assert_eq!(snapshot.registry().get_group("a", "a"), "webapp");
    assert_eq!(snapshot.registry().get_group("z", "z"), "z");

    let entry = snapshot.get("group:webapp").unwrap();
    assert_eq!(entry.get("programs"), Some("a,b,c"));
    assert_eq!(entry.group.as_deref(), Some("webapp"));

    assert_eq!(snapshot.get("a").unwrap().group.as_deref(), Some("webapp"));
}

#[test]
fn test_group_from_decoded_sequence() {
    let tree = ConfigTree::from_yaml_str(
        r#"
groups:
  workers:
    programs: [q1, q2]
    priority: 999
"#,
    )
    .unwrap();

    let snapshot = materialize(&tree, &options()).unwrap();
    let entry = snapshot.get("group:workers").unwrap();
    assert_eq!(entry.get("programs"), Some("q1,q2"));
    assert_eq!(entry.get("priority"), Some("999"));
}

#[test]
fn test_singleton_sections() {
    let tree = ConfigTree::new()
        .with_section(SUPERVISORD, fields(&[("logfile", "/tmp/s.log".into())]))
        .unwrap()
        .with_section(UNIX_HTTP_SERVER, fields(&[("file", "/tmp/s.sock".into())]))
        .unwrap();

    let snapshot = materialize(&tree, &options()).unwrap();

    let daemon = snapshot.get(SUPERVISORD).unwrap();
    assert_eq!(daemon.name, SUPERVISORD);
    assert_eq!(daemon.get("logfile"), Some("/tmp/s.log"));
    assert!(daemon.group.is_none());
    assert_eq!(
        snapshot.get(UNIX_HTTP_SERVER).unwrap().get("file"),
        Some("/tmp/s.sock")
    );
    assert!(snapshot.loaded_programs().is_empty());
}

#[test]
fn test_environment_composition() {
    let mut env = FieldMap::new();
    env.insert("PORT".to_string(), FieldValue::Int(8080));
    env.insert("MODE".to_string(), "prod".into());
    let tree = ConfigTree::new()
        .with_program(
            "api",
            fields(&[("command", "run".into()), ("environment", FieldValue::Map(env))]),
        )
        .with_program("bare", fields(&[("command", "run".into())]));

    let snapshot = materialize(&tree, &options()).unwrap();

    assert_eq!(
        snapshot.get("api").unwrap().get("environment"),
        Some(r#"MODE="prod",PORT="8080",PROC_NAME="api",INST_NAME="api""#)
    );
    assert_eq!(
        snapshot.get("bare").unwrap().environment_pairs(),
        vec![
            ("PROC_NAME".to_string(), "bare".to_string()),
            ("INST_NAME".to_string(), "bare".to_string()),
        ]
    );
}

#[test]
fn test_instances_have_required_keys() {
    let tree = ConfigTree::new().with_program("x", fields(&[("numprocs", FieldValue::Int(2))]));

    let snapshot = materialize(&tree, &options()).unwrap();
    for entry in snapshot.entries().programs() {
        for key in [
            "process_name",
            "process_num",
            "numprocs_start",
            "environment",
            "command",
        ] {
            assert!(entry.get(key).is_some(), "{} missing {key}", entry.name);
        }
        assert_eq!(entry.get("command"), Some(""));
    }
}

#[test]
fn test_instance_isolation() {
    let mut env = FieldMap::new();
    env.insert("A".to_string(), "1".into());
    let tree = ConfigTree::new().with_program(
        "w",
        fields(&[
            ("command", "run".into()),
            ("numprocs", FieldValue::Int(2)),
            ("environment", FieldValue::Map(env)),
        ]),
    );

    let snapshot = materialize(&tree, &options()).unwrap();
    let (mut store, _, _) = snapshot.into_parts();

    store
        .get_mut("w_1")
        .unwrap()
        .set("environment", "CHANGED=\"yes\"");

    assert_eq!(
        store.get("w_2").unwrap().get("environment"),
        Some(r#"A="1",PROC_NAME="w",INST_NAME="w_2""#)
    );
    assert_eq!(
        tree.programs["w"]["environment"].render(),
        r#"A="1""#
    );
}

#[test]
fn test_materialize_is_idempotent() {
    let tree = ConfigTree::new()
        .with_group("g", group("a,b"))
        .with_program(DEFAULT_PROGRAM, fields(&[("autorestart", "true".into())]))
        .with_program(
            "a",
            fields(&[("command", "%(program_name)s".into()), ("numprocs", FieldValue::Int(3))]),
        )
        .with_program("b", fields(&[("command", "b".into())]));

    let first = materialize(&tree, &options()).unwrap();
    let second = materialize(&tree, &options()).unwrap();

    assert_eq!(first.entries(), second.entries());
    assert_eq!(first.loaded_programs(), second.loaded_programs());
    assert_eq!(first, second);
}

#[test]
fn test_collision_overwrites_by_default() {
    let tree = ConfigTree::new()
        .with_program(
            "alpha",
            fields(&[("command", "alpha".into()), ("process_name", "shared".into())]),
        )
        .with_program(
            "beta",
            fields(&[("command", "beta".into()), ("process_name", "shared".into())]),
        );

    let snapshot = materialize(&tree, &options()).unwrap();

    assert_eq!(snapshot.loaded_programs(), ["shared", "shared"]);
    assert_eq!(snapshot.entries().programs().count(), 1);
    assert_eq!(snapshot.get("shared").unwrap().get("command"), Some("beta"));
}

#[test]
fn test_collision_rejected_when_configured() {
    let tree = ConfigTree::new()
        .with_program("web_1", fields(&[("command", "a".into())]))
        .with_program(
            "web",
            fields(&[("command", "b".into()), ("numprocs", FieldValue::Int(2))]),
        );
    let opts = options().with_collision_policy(CollisionPolicy::Reject);

    let err = materialize(&tree, &opts).unwrap_err();
    match err {
        Error::NameCollision { name, .. } => assert_eq!(name, "web_1"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_event_listeners_expand_like_programs() {
    let tree = ConfigTree::new()
        .with_program(DEFAULT_PROGRAM, fields(&[("autostart", "true".into())]))
        .with_program("web", fields(&[("command", "serve".into())]))
        .with_event_listener(
            "memmon",
            fields(&[
                ("command", "memmon -p %(program_name)s=200MB".into()),
                ("events", "TICK_60".into()),
                ("numprocs", FieldValue::Int(2)),
            ]),
        );

    let snapshot = materialize(&tree, &options()).unwrap();

    assert_eq!(snapshot.loaded_programs(), ["web", "memmon_1", "memmon_2"]);
    let listener = snapshot.get("memmon_2").unwrap();
    assert_eq!(listener.name, "eventlistener:memmon_2");
    assert!(listener.is_event_listener());
    assert_eq!(listener.get("command"), Some("memmon -p memmon=200MB"));
    assert_eq!(listener.get("autostart"), Some("true"));
}

#[test]
fn test_helpers() {
    let eval = TokenEvaluator::new().with_binding(PROCESS_NUM, "4");
    assert_eq!(resolve_process_name(&eval, "w", 4, 1).unwrap(), "w");
    assert_eq!(resolve_process_name(&eval, "w", 4, 5).unwrap(), "w_4");
    assert_eq!(
        resolve_process_name(&eval, "w%(process_num)d", 4, 5).unwrap(),
        "w4"
    );
    assert_eq!(
        compose_environment(Some("  "), "p", "p_1"),
        r#"PROC_NAME="p",INST_NAME="p_1""#
    );
    assert_eq!(instance_count(&fields(&[("numprocs", FieldValue::Int(7))])), 7);
}
