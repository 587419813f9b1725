//! End-to-end programs run through the public engine API.

use std::io::Cursor;

use pebble_vm::{
    Block, Config, Engine, Error, Input, Operation, OperationType, Program, RuntimeError, Value,
};

fn engine() -> Engine {
    Engine::with_config(Config::default().with_echo(false))
}

fn var(name: &str) -> Operation {
    Operation::var(name)
}

fn int(n: i64) -> Operation {
    Operation::integer(n)
}

fn binary(kind: OperationType, lhs: Operation, rhs: Operation) -> Operation {
    Operation::binary(kind, lhs, rhs)
}

// ============================================================================
// Expressions and Control Flow
// ============================================================================

#[test]
fn test_arithmetic_assignment() {
    let mut engine = engine();
    let program = Program::new(Block::new().with(Operation::assign(
        var("a"),
        binary(OperationType::Add, int(2), int(3)),
    )));

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.value(), Some(&Value::Integer(5)));
    assert_eq!(engine.vm().lookup_global("a").unwrap().value, Value::Integer(5));
    assert!(execution.diagnostics.is_empty());
}

#[test]
fn test_if_else_takes_one_arm() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::assign(var("x"), int(10)))
            .with(Operation::if_clause(binary(OperationType::IsGreaterThan, var("x"), int(5))))
            .with_block(Block::new().with(Operation::print(Operation::string("big"))))
            .with(Operation::else_clause())
            .with_block(Block::new().with(Operation::print(Operation::string("small")))),
    );

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.output, "big\n");
}

#[test]
fn test_elseif_chain() {
    let chain = |x: i64| {
        Program::new(
            Block::new()
                .with(Operation::assign(var("x"), int(x)))
                .with(Operation::if_clause(binary(OperationType::IsLessThan, var("x"), int(0))))
                .with_block(Block::new().with(Operation::print(Operation::string("negative"))))
                .with(Operation::elseif_clause(binary(OperationType::IsEqual, var("x"), int(0))))
                .with_block(Block::new().with(Operation::print(Operation::string("zero"))))
                .with(Operation::else_clause())
                .with_block(Block::new().with(Operation::print(Operation::string("positive"))))
                .with(Operation::print(Operation::string("done"))),
        )
    };

    let mut engine = engine();
    assert_eq!(engine.run(&chain(-4)).unwrap().output, "negative\ndone\n");
    assert_eq!(engine.run(&chain(0)).unwrap().output, "zero\ndone\n");
    assert_eq!(engine.run(&chain(9)).unwrap().output, "positive\ndone\n");
}

#[test]
fn test_while_loop_counts() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::assign(var("i"), int(1)))
            .with(Operation::while_loop(binary(
                OperationType::IsLessThanOrEqual,
                var("i"),
                int(3),
            )))
            .with_block(
                Block::new()
                    .with(Operation::print(var("i")))
                    .with(Operation::assign(var("i"), binary(OperationType::Add, var("i"), int(1)))),
            ),
    );

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.output, "1\n2\n3\n");
    assert_eq!(engine.vm().lookup_global("i").unwrap().value, Value::Integer(4));
}

#[test]
fn test_while_false_skips_body() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::assign(var("i"), int(5)))
            .with(Operation::while_loop(binary(OperationType::IsLessThan, var("i"), int(3))))
            .with_block(Block::new().with(Operation::print(Operation::string("body"))))
            .with(Operation::print(Operation::string("done"))),
    );

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.output, "done\n");
    assert_eq!(engine.vm().lookup_global("i").unwrap().value, Value::Integer(5));
}

#[test]
fn test_not_equal_strings() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::print(binary(
                OperationType::IsNotEqual,
                Operation::string("a"),
                Operation::string("b"),
            )))
            .with(Operation::print(binary(
                OperationType::IsNotEqual,
                Operation::string("a"),
                Operation::string("a"),
            ))),
    );

    assert_eq!(engine.run(&program).unwrap().output, "true\nfalse\n");
}

#[test]
fn test_string_concatenation() {
    let mut engine = engine();
    let program = Program::new(Block::new().with(Operation::print(binary(
        OperationType::Add,
        Operation::string("peb"),
        Operation::string("ble"),
    ))));

    assert_eq!(engine.run(&program).unwrap().output, "pebble\n");
}

// ============================================================================
// Methods
// ============================================================================

#[test]
fn test_method_returns_value() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::define(var("f"), &[]))
            .with_block(Block::new().with(Operation::ret(Some(int(7)))))
            .with(Operation::assign(var("r"), Operation::call(None, "f", vec![]))),
    );

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.value(), Some(&Value::Integer(7)));
    assert_eq!(engine.vm().lookup_global("r").unwrap().value, Value::Integer(7));
}

#[test]
fn test_recursive_factorial() {
    let mut engine = engine();
    let n_minus_one = binary(OperationType::Subtract, var("n"), int(1));
    let program = Program::new(
        Block::new()
            .with(Operation::define(var("fact"), &["n"]))
            .with_block(
                Block::new()
                    .with(Operation::if_clause(binary(
                        OperationType::IsLessThanOrEqual,
                        var("n"),
                        int(1),
                    )))
                    .with_block(Block::new().with(Operation::ret(Some(int(1)))))
                    .with(Operation::ret(Some(binary(
                        OperationType::Multiply,
                        var("n"),
                        Operation::call(None, "fact", vec![n_minus_one]),
                    )))),
            )
            .with(Operation::print(Operation::call(None, "fact", vec![int(5)]))),
    );

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.output, "120\n");
}

#[test]
fn test_two_parameters_bind_in_order() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::define(var("sub"), &["a", "b"]))
            .with_block(Block::new().with(Operation::ret(Some(binary(
                OperationType::Subtract,
                var("a"),
                var("b"),
            )))))
            .with(Operation::call(None, "sub", vec![int(10), int(4)])),
    );

    assert_eq!(engine.run(&program).unwrap().value(), Some(&Value::Integer(6)));
}

#[test]
fn test_recursion_through_self() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::define(var("f"), &["n"]))
            .with_block(
                Block::new()
                    .with(Operation::if_clause(binary(OperationType::IsLessThan, var("n"), int(1))))
                    .with_block(Block::new().with(Operation::ret(Some(int(0)))))
                    .with(Operation::ret(Some(binary(
                        OperationType::Add,
                        var("n"),
                        Operation::call(
                            None,
                            "self",
                            vec![binary(OperationType::Subtract, var("n"), int(1))],
                        ),
                    )))),
            )
            .with(Operation::call(None, "f", vec![int(3)])),
    );

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.value(), Some(&Value::Integer(6)));
    assert!(execution.diagnostics.is_empty());
}

#[test]
fn test_self_and_it_keywords() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::define(var("make"), &[]))
            .with_block(
                Block::new()
                    .with(Operation::assign(var("v"), int(5)))
                    .with(Operation::ret(Some(var("self")))),
            )
            .with(Operation::assign(var("o"), Operation::call(None, "make", vec![])))
            .with(Operation::print(Operation::attr(var("o"), "v")))
            .with(binary(OperationType::Add, int(1), int(2)))
            .with(Operation::print(var("it")))
            .with(Operation::if_clause(Operation::boolean(true)))
            .with_block(Block::new().with(Operation::print(var("it")))),
    );

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.output, "5\n3\nNothing\n");
}

#[test]
fn test_return_without_value_yields_caller() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::assign(var("p"), Operation::new_object(var("Object"))))
            .with(Operation::assign(Operation::attr(var("p"), "x"), int(42)))
            .with(Operation::define(Operation::attr(var("p"), "touch"), &[]))
            .with_block(Block::new().with(Operation::ret(None)))
            .with(Operation::assign(var("q"), Operation::call(Some(var("p")), "touch", vec![])))
            .with(Operation::print(Operation::attr(var("q"), "x"))),
    );

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.output, "42\n");
}

#[test]
fn test_return_without_value_or_caller_yields_self() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::define(var("g"), &[]))
            .with_block(
                Block::new()
                    .with(Operation::assign(var("y"), int(1)))
                    .with(Operation::ret(None)),
            )
            .with(Operation::assign(var("r"), Operation::call(None, "g", vec![])))
            .with(Operation::print(Operation::attr(var("r"), "y")))
            .with(Operation::print(var("r"))),
    );

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.output, "1\nMethod\n");
}

#[test]
fn test_repeated_calls_do_not_grow_heap() {
    let calls = |count: i64| {
        Program::new(
            Block::new()
                .with(Operation::define(var("f"), &["n"]))
                .with_block(Block::new().with(Operation::ret(Some(binary(
                    OperationType::Add,
                    var("n"),
                    int(1),
                )))))
                .with(Operation::assign(var("r"), int(0)))
                .with(Operation::assign(var("i"), int(0)))
                .with(Operation::while_loop(binary(OperationType::IsLessThan, var("i"), int(count))))
                .with_block(
                    Block::new()
                        .with(Operation::assign(var("r"), Operation::call(None, "f", vec![int(7)])))
                        .with(Operation::assign(var("i"), binary(OperationType::Add, var("i"), int(1)))),
                ),
        )
    };
    let mut engine = engine();

    engine.run(&calls(10)).unwrap();
    let after_ten = (engine.vm().heap().binding_count(), engine.vm().heap().scope_count());
    assert_eq!(engine.vm().lookup_global("r").unwrap().value, Value::Integer(8));

    engine.run(&calls(1000)).unwrap();
    let after_thousand = (engine.vm().heap().binding_count(), engine.vm().heap().scope_count());
    assert_eq!(engine.vm().lookup_global("i").unwrap().value, Value::Integer(1000));
    assert_eq!(after_ten, after_thousand);
}

// ============================================================================
// Objects and Arrays
// ============================================================================

#[test]
fn test_object_attributes() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::assign(var("p"), Operation::new_object(var("Object"))))
            .with(Operation::assign(Operation::attr(var("p"), "x"), int(4)))
            .with(Operation::print(Operation::attr(var("p"), "x")))
            .with(Operation::print(var("p"))),
    );

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.output, "4\nObject\n");
}

#[test]
fn test_method_reads_caller_attributes() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::assign(var("p"), Operation::new_object(var("Object"))))
            .with(Operation::assign(Operation::attr(var("p"), "x"), int(4)))
            .with(Operation::define(Operation::attr(var("p"), "get"), &[]))
            .with_block(Block::new().with(Operation::ret(Some(Operation::attr(var("caller"), "x")))))
            .with(Operation::define(Operation::attr(var("p"), "bare"), &[]))
            .with_block(Block::new().with(Operation::ret(Some(var("x")))))
            .with(Operation::print(Operation::call(Some(var("p")), "get", vec![])))
            .with(Operation::print(Operation::call(Some(var("p")), "bare", vec![]))),
    );

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.output, "4\n4\n");
}

#[test]
fn test_array_elements() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::assign(var("a"), Operation::call(None, "Array", vec![int(3)])))
            .with(Operation::assign(Operation::index(var("a"), int(1)), int(9)))
            .with(Operation::print(Operation::index(var("a"), int(1))))
            .with(Operation::print(Operation::attr(var("a"), "size"))),
    );

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.output, "9\n3\n");
}

#[test]
fn test_array_out_of_bounds_is_fatal() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::assign(var("a"), Operation::call(None, "Array", vec![int(3)])).at_line(1))
            .with(Operation::print(Operation::string("before")).at_line(2))
            .with(Operation::print(Operation::index(var("a"), int(5))).at_line(3))
            .with(Operation::print(Operation::string("after")).at_line(4)),
    );

    let result = engine.run(&program);
    match result {
        Err(Error::Fatal { line, error }) => {
            assert_eq!(line, 3);
            assert_eq!(
                error,
                RuntimeError::IndexOutOfBounds {
                    name: "a".to_string(),
                    index: 5,
                    size: 3,
                }
            );
        }
        other => panic!("expected a fatal error, got {:?}", other),
    }
    assert_eq!(engine.vm().output(), "before\n");
    assert!(engine.vm().diagnostics().last().unwrap().is_fatal());
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_type_mismatch_is_recoverable() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::assign(
                var("y"),
                binary(OperationType::Add, int(1), Operation::string("x")),
            ))
            .with(Operation::print(Operation::string("after"))),
    );

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.output, "after\n");
    assert_eq!(execution.diagnostics.len(), 1);
    assert!(!execution.diagnostics[0].is_fatal());
    assert!(execution.diagnostics[0].message.contains("cannot add"));
    assert!(engine.vm().lookup_global("y").unwrap().is_null());
}

#[test]
fn test_attribute_of_primitive_is_recoverable() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::print(Operation::attr(int(5), "x")))
            .with(Operation::print(Operation::string("after"))),
    );

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.output, "Nothing\nafter\n");
    assert_eq!(execution.diagnostics.len(), 1);
    assert!(!execution.diagnostics[0].is_fatal());
}

#[test]
fn test_wrong_argument_count_is_fatal() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::define(var("f"), &["a"]))
            .with_block(Block::new().with(Operation::ret(Some(var("a")))))
            .with(Operation::call(None, "f", vec![])),
    );

    let error = engine.run(&program).unwrap_err();
    assert_eq!(
        error.runtime(),
        Some(&RuntimeError::ArgumentCount {
            name: "f".to_string(),
            expected: 1,
            got: 0,
        })
    );
}

#[test]
fn test_calling_a_value_is_fatal() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::assign(var("g"), int(1)))
            .with(Operation::call(None, "g", vec![])),
    );

    let error = engine.run(&program).unwrap_err();
    assert!(matches!(
        error.runtime(),
        Some(RuntimeError::NotCallable { name }) if name == "g"
    ));
}

#[test]
fn test_dangling_else_is_compile_error() {
    let mut engine = engine();
    let program = Program::new(
        Block::new()
            .with(Operation::else_clause())
            .with_block(Block::new()),
    );

    assert!(matches!(engine.run(&program), Err(Error::Compile(_))));
}

// ============================================================================
// Input and Serialized Programs
// ============================================================================

#[test]
fn test_ask_reads_input() {
    let mut engine = engine();
    engine.set_input(Input::Reader(Box::new(Cursor::new("Ada\nLovelace\n"))));
    let program = Program::new(
        Block::new()
            .with(Operation::assign(var("name"), Operation::ask(Some(Operation::string("Name?")))))
            .with(Operation::print(var("name"))),
    );

    let execution = engine.run(&program).unwrap();
    assert_eq!(execution.output, "Name?\nAda\n");
}

#[test]
fn test_run_json_program() {
    let json = r#"{"main":{"executables":[
        {"Operation":{"kind":"Print","operands":[
            {"kind":"Ref","value":{"Literal":{"String":"hi"}},"line":1}
        ],"line":1}}
    ]}}"#;

    let mut engine = engine();
    let execution = engine.run_json(json).unwrap();
    assert_eq!(execution.output, "hi\n");
}

#[test]
fn test_serialized_program_runs_the_same() {
    let program = Program::new(
        Block::new()
            .with(Operation::assign(var("i"), int(0)))
            .with(Operation::while_loop(binary(OperationType::IsLessThan, var("i"), int(2))))
            .with_block(
                Block::new()
                    .with(Operation::print(var("i")))
                    .with(Operation::assign(var("i"), binary(OperationType::Add, var("i"), int(1)))),
            ),
    );
    let json = serde_json::to_string(&program).unwrap();

    let mut engine = engine();
    let direct = engine.run(&program).unwrap().output;
    let parsed = engine.run_json(&json).unwrap().output;
    assert_eq!(direct, parsed);
    assert_eq!(parsed, "0\n1\n");
}

#[test]
fn test_runs_are_independent() {
    let mut engine = engine();
    engine
        .run(&Program::new(Block::new().with(Operation::assign(var("a"), int(1)))))
        .unwrap();
    engine
        .run(&Program::new(Block::new().with(Operation::print(Operation::string("x")))))
        .unwrap();

    assert!(engine.vm().lookup_global("a").is_none());
    assert_eq!(engine.vm().output(), "x\n");
}
