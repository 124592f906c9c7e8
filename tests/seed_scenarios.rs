//! End-to-end coverage of the seed scenarios and boundary behaviors a
//! reader of the language guide would expect to hold, driven entirely
//! through the public `load`/`Document`/`TupleHandle` facade.

use pretty_assertions::assert_eq;
use yamlet::{load, FailureKind, Options, Value};

fn as_str(v: &Value) -> &str {
    match v {
        Value::Str(s) => s,
        other => panic!("expected a string, got {other:?}"),
    }
}

fn as_int(v: &Value) -> i64 {
    match v {
        Value::Int(i) => *i,
        other => panic!("expected an int, got {other:?}"),
    }
}

fn as_sequence(v: &Value) -> Vec<Value> {
    match v {
        Value::Sequence(items) => items.as_ref().clone(),
        other => panic!("expected a sequence, got {other:?}"),
    }
}

// =============================================================================
// 1. Basic override
// =============================================================================

#[test]
fn basic_override_late_binds_against_the_compositing_scope() {
    let doc = load(
        r#"
t1:
  val: world
  deferred: !fmt 'Hello, {val}!'
t2: !composite [t1, { val: "all you happy people" }]
"#,
        Options::default(),
    )
    .unwrap();

    let t1 = doc.root().get_tuple("t1").unwrap();
    assert_eq!(as_str(&t1.get("deferred").unwrap()), "Hello, world!");

    let t2 = doc.root().get_tuple("t2").unwrap();
    assert_eq!(as_str(&t2.get("deferred").unwrap()), "Hello, all you happy people!");
}

// =============================================================================
// 2. Conditional templating
// =============================================================================

#[test]
fn conditional_templating_picks_the_winning_arm_after_composition() {
    let doc = load(
        r#"
t0:
  !if animal == 'fish': {environment: water}
  !elif animal == 'dog': {attention: pats, toys: !expr '[favorite_toy]'}
  !else: {recommendation: specialist}
t2: !composite [t0, {animal: dog, favorite_toy: "squeaky ball"}]
"#,
        Options::default(),
    )
    .unwrap();

    let t2 = doc.root().get_tuple("t2").unwrap();
    let keys: std::collections::HashSet<String> = t2.keys().into_iter().map(|k| k.to_string()).collect();
    let expected: std::collections::HashSet<String> =
        ["animal", "attention", "toys", "favorite_toy"].into_iter().map(str::to_owned).collect();
    assert_eq!(keys, expected);

    let toys = as_sequence(&t2.get("toys").unwrap());
    assert_eq!(toys.len(), 1);
    assert_eq!(as_str(&toys[0]), "squeaky ball");
}

// =============================================================================
// 3. Up/super chain
// =============================================================================

#[test]
fn up_and_super_walk_the_scope_and_override_chain_independently() {
    let doc = load(
        r#"
t1:
  a: one
  sub:
    a: two
t2: !composite
  - t1
  - a: three
    sub:
      a: four
      counting: !fmt '{up.super.a} {super.a} {up.a} {a}'
"#,
        Options::default(),
    )
    .unwrap();

    let sub = doc.root().get_tuple("t2").unwrap().get_tuple("sub").unwrap();
    assert_eq!(as_str(&sub.get("counting").unwrap()), "one two three four");
}

// =============================================================================
// 4. Cycle detection
// =============================================================================

#[test]
fn mutually_recursive_expressions_fail_with_dependency_cycle() {
    let doc = load(
        r#"
recursive:
  a: !expr b
  b: !expr a
"#,
        Options::default(),
    )
    .unwrap();

    let err = doc.root().get_tuple("recursive").unwrap().get("a").unwrap_err();
    assert_eq!(err.kind, FailureKind::DependencyCycle);
    assert!(!err.frames.is_empty());
}

// =============================================================================
// 5. Nullify erasure
// =============================================================================

#[test]
fn null_erases_a_key_and_external_does_not_override_an_existing_one() {
    let doc = load(
        r#"
t1:
  a: apple
  b: boy
  c: cat
  d: dog
t2:
  b: null
  c: null
  d: !external
t3: !composite [t1, t2]
"#,
        Options::default(),
    )
    .unwrap();

    let t3 = doc.root().get_tuple("t3").unwrap();
    assert_eq!(t3.len(), 2);
    assert!(!t3.contains("b"));
    assert!(!t3.contains("c"));
    assert_eq!(as_str(&t3.get("a").unwrap()), "apple");
    assert_eq!(as_str(&t3.get("d").unwrap()), "dog");
}

// =============================================================================
// 6. Implicit composition in expression
// =============================================================================

#[test]
fn adjacent_mapping_literal_implicitly_composes_with_a_tuple() {
    let doc = load(
        r#"
t1:
  a: 10
  b: 10
  c: 30
val: !expr len(t1 {c: 30, d: 40, e: 50})
"#,
        Options::default(),
    )
    .unwrap();

    assert_eq!(as_int(&doc.root().get("val").unwrap()), 5);
}

// =============================================================================
// Boundary behaviors
// =============================================================================

#[test]
fn fmt_brace_escaping_follows_the_double_brace_rule() {
    let doc = load(
        r#"
v: Hello
one: !fmt '{{{v}}}'
two: !fmt '{{s}}'
three: !fmt '{{{{x}}}}'
"#,
        Options::default(),
    )
    .unwrap();

    assert_eq!(as_str(&doc.root().get("one").unwrap()), "{Hello}");
    assert_eq!(as_str(&doc.root().get("two").unwrap()), "{s}");
    assert_eq!(as_str(&doc.root().get("three").unwrap()), "{{x}}");
}

#[test]
fn expr_bitwise_or_uses_host_integer_semantics() {
    let doc = load("val: !expr 0xFF | 0x1F7\n", Options::default()).unwrap();
    assert_eq!(as_int(&doc.root().get("val").unwrap()), 0xFF | 0x1F7);
}

#[test]
fn external_raises_on_access_and_null_is_absent_but_unreadable() {
    let doc = load(
        r#"
vals:
  a: !external
  b: null
"#,
        Options::default(),
    )
    .unwrap();

    let vals = doc.root().get_tuple("vals").unwrap();

    let err = vals.get("a").unwrap_err();
    assert_eq!(err.kind, FailureKind::AccessOnExternal);
    assert!(vals.contains("a"));

    let err = vals.get("b").unwrap_err();
    assert_eq!(err.kind, FailureKind::NameNotFound);
    assert!(!vals.contains("b"));

    assert_eq!(vals.len(), 1);
}
