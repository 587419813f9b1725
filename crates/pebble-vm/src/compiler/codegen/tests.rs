//! Tests for the bytecode compiler.

use super::*;
use crate::compiler::pools::Constant;
use crate::runtime::value::Value;

fn compile_program(block: Block) -> Result<CompiledProgram, CompileError> {
    let mut compiler = Compiler::new();
    compiler.compile(&Program::new(block))
}

fn compile_ok(block: Block) -> CompiledProgram {
    compile_program(block).expect("Compilation should succeed")
}

fn opcodes(program: &CompiledProgram) -> Vec<OpCode> {
    program.bytecode.instructions.iter().map(|i| i.opcode).collect()
}

fn op(opcode: OpCode, operand: u8) -> Instruction {
    Instruction::with_operand(opcode, operand)
}

#[test]
fn test_compiler_new() {
    let compiler = Compiler::new();
    assert!(compiler.bytecode.instructions.is_empty());
}

#[test]
fn test_compiler_default() {
    let compiler = Compiler::default();
    assert!(compiler.bytecode.instructions.is_empty());
}

#[test]
fn test_compile_empty_program() {
    let program = compile_ok(Block::new());
    assert_eq!(program.bytecode.instructions, vec![op(OpCode::Return, 0)]);
}

#[test]
fn test_compile_assignment_of_sum() {
    let program = compile_ok(Block::new().with(Operation::assign(
        Operation::var("a"),
        Operation::binary(OperationType::Add, Operation::integer(2), Operation::integer(3)),
    )));

    assert_eq!(
        program.bytecode.instructions,
        vec![
            op(OpCode::LoadName, 0),
            op(OpCode::ResolveDirect, 0),
            op(OpCode::LoadLiteral, 3),
            op(OpCode::LoadLiteral, 4),
            op(OpCode::Add, 0),
            op(OpCode::Assign, 0),
            op(OpCode::EndStatement, 0),
            op(OpCode::Return, 0),
        ]
    );
    assert_eq!(program.pools.constants.get(3), Some(&Constant::Primitive(Value::Integer(2))));
    assert_eq!(program.pools.names.get(0), Some("a"));
}

#[test]
fn test_compile_rvalue_is_dereferenced() {
    let program = compile_ok(Block::new().with(Operation::print(Operation::var("x"))));
    assert_eq!(
        opcodes(&program),
        vec![
            OpCode::LoadName,
            OpCode::ResolveDirect,
            OpCode::Dereference,
            OpCode::Syscall,
            OpCode::EndStatement,
            OpCode::Return,
        ]
    );
}

#[test]
fn test_compile_keyword_is_not_dereferenced() {
    let program = compile_ok(Block::new().with(Operation::print(Operation::var("self"))));
    assert_eq!(
        opcodes(&program),
        vec![
            OpCode::LoadName,
            OpCode::ResolveDirect,
            OpCode::Syscall,
            OpCode::EndStatement,
            OpCode::Return,
        ]
    );
}

#[test]
fn test_compile_scoped_assignment() {
    let program = compile_ok(Block::new().with(Operation::assign(
        Operation::attr(Operation::var("o"), "x"),
        Operation::integer(1),
    )));

    assert_eq!(
        opcodes(&program),
        vec![
            OpCode::LoadName,
            OpCode::ResolveDirect,
            OpCode::Dereference,
            OpCode::LoadName,
            OpCode::ResolveScoped,
            OpCode::LoadLiteral,
            OpCode::Assign,
            OpCode::EndStatement,
            OpCode::Return,
        ]
    );
}

#[test]
fn test_compile_comparison_bits() {
    let cases = [
        (OperationType::IsEqual, ComparisonBit::Equal),
        (OperationType::IsLessThan, ComparisonBit::Less),
        (OperationType::IsGreaterThan, ComparisonBit::Greater),
        (OperationType::IsLessThanOrEqual, ComparisonBit::LessOrEqual),
        (OperationType::IsGreaterThanOrEqual, ComparisonBit::GreaterOrEqual),
    ];

    for (kind, bit) in cases {
        let program = compile_ok(Block::new().with(Operation::binary(
            kind,
            Operation::integer(1),
            Operation::integer(2),
        )));
        let instructions = &program.bytecode.instructions;
        assert_eq!(instructions[2], op(OpCode::Compare, 0));
        assert_eq!(instructions[3], op(OpCode::LoadComparisonBit, bit as u8));
    }
}

#[test]
fn test_compile_not_equal() {
    let program = compile_ok(Block::new().with(Operation::binary(
        OperationType::IsNotEqual,
        Operation::string("a"),
        Operation::string("b"),
    )));
    assert_eq!(program.bytecode.instructions[2], op(OpCode::NotEqual, 0));
}

#[test]
fn test_compile_if_else_chain() {
    let program = compile_ok(
        Block::new()
            .with(Operation::assign(Operation::var("x"), Operation::integer(10)).at_line(1))
            .with(
                Operation::if_clause(Operation::binary(
                    OperationType::IsGreaterThan,
                    Operation::var("x"),
                    Operation::integer(5),
                ))
                .at_line(2),
            )
            .with_block(Block::new().with(Operation::print(Operation::string("big")).at_line(3)))
            .with(Operation::else_clause().at_line(4))
            .with_block(Block::new().with(Operation::print(Operation::string("small")).at_line(5))),
    );
    let code = &program.bytecode.instructions;

    assert_eq!(code[10], op(OpCode::LoadComparisonBit, ComparisonBit::Greater as u8));
    assert_eq!(code[11], op(OpCode::JumpIfFalse, 20));
    assert_eq!(code[12], op(OpCode::Nop, 0));
    assert_eq!(code[13], op(OpCode::EnterLocal, 0));
    assert_eq!(code[17], op(OpCode::LeaveLocal, 0));
    assert_eq!(code[18], op(OpCode::Jump, 25));
    assert_eq!(code[20], op(OpCode::EnterLocal, 0));
    assert_eq!(code[24], op(OpCode::LeaveLocal, 0));
    assert_eq!(code[25], op(OpCode::Return, 0));
    assert_eq!(code.len(), 26);
}

#[test]
fn test_compile_elseif_arms_converge() {
    let program = compile_ok(
        Block::new()
            .with(Operation::if_clause(Operation::var("a")))
            .with_block(Block::new().with(Operation::print(Operation::integer(1))))
            .with(Operation::elseif_clause(Operation::var("b")))
            .with_block(Block::new().with(Operation::print(Operation::integer(2))))
            .with(Operation::print(Operation::integer(3))),
    );
    let code = &program.bytecode.instructions;

    // Both arm exits land on the statement after the chain.
    let after_chain = program.bytecode.lines.last().map(|entry| entry.offset).unwrap();
    let exits: Vec<_> = code.iter().filter(|i| i.opcode == OpCode::Jump).collect();
    assert_eq!(exits.len(), 2);
    assert!(exits.iter().all(|i| i.operand as usize == after_chain));

    // The first false branch lands on the elseif condition.
    let elseif_start = program.bytecode.lines[2].offset;
    let false_jumps: Vec<_> = code.iter().filter(|i| i.opcode == OpCode::JumpIfFalse).collect();
    assert_eq!(false_jumps[0].operand as usize, elseif_start);
    // The last false branch skips the final arm.
    assert_eq!(false_jumps[1].operand as usize, after_chain);
}

#[test]
fn test_compile_if_at_end_of_block_is_resolved() {
    let program = compile_ok(
        Block::new()
            .with(Operation::if_clause(Operation::boolean(false)))
            .with_block(Block::new().with(Operation::print(Operation::integer(1)))),
    );
    let code = &program.bytecode.instructions;
    let ret = code.len() - 1;

    assert_eq!(code[1], op(OpCode::JumpIfFalse, ret as u8));
    assert!(code.iter().any(|i| *i == op(OpCode::Jump, ret as u8)));
}

#[test]
fn test_compile_while_loop() {
    let program = compile_ok(
        Block::new()
            .with(Operation::assign(Operation::var("i"), Operation::integer(0)))
            .with(Operation::while_loop(Operation::binary(
                OperationType::IsLessThan,
                Operation::var("i"),
                Operation::integer(3),
            )))
            .with_block(Block::new().with(Operation::assign(
                Operation::var("i"),
                Operation::binary(OperationType::Add, Operation::var("i"), Operation::integer(1)),
            ))),
    );
    let code = &program.bytecode.instructions;

    assert_eq!(code[11], op(OpCode::JumpIfFalse, 25));
    assert_eq!(code[13], op(OpCode::EnterLocal, 0));
    assert_eq!(code[23], op(OpCode::LeaveLocal, 0));
    assert_eq!(code[24], op(OpCode::Jump, 5));
    assert_eq!(code[25], op(OpCode::Return, 0));
}

#[test]
fn test_compile_method_definition_and_call() {
    let program = compile_ok(
        Block::new()
            .with(Operation::define(Operation::var("f"), &[]))
            .with_block(Block::new().with(Operation::ret(Some(Operation::integer(7)))))
            .with(Operation::call(None, "f", vec![])),
    );
    let code = &program.bytecode.instructions;

    assert_eq!(code[2], op(OpCode::DefineMethod, 0));
    assert_eq!(code[3], op(OpCode::BindSection, 9));
    assert_eq!(code[5], op(OpCode::Assign, 0));
    assert_eq!(code[7], op(OpCode::Jump, 13));
    assert_eq!(code[9], op(OpCode::LoadLiteral, 3));
    assert_eq!(code[10], op(OpCode::Return, 1));
    assert_eq!(code[12], op(OpCode::Return, 0));
    assert_eq!(code[13], op(OpCode::LoadLiteral, pools::NOTHING as u8));
    assert_eq!(code[17], op(OpCode::Copy, 0));
    assert_eq!(code[18], op(OpCode::Evaluate, 0));
}

#[test]
fn test_compile_method_parameters() {
    let program = compile_ok(
        Block::new()
            .with(Operation::define(Operation::var("add"), &["a", "b"]))
            .with_block(Block::new().with(Operation::ret(Some(Operation::binary(
                OperationType::Add,
                Operation::var("a"),
                Operation::var("b"),
            ))))),
    );
    let code = &program.bytecode.instructions;

    assert_eq!(code[2], op(OpCode::LoadName, 1));
    assert_eq!(code[3], op(OpCode::LoadName, 2));
    assert_eq!(code[4], op(OpCode::DefineMethod, 2));
}

#[test]
fn test_compile_call_on_caller() {
    let program = compile_ok(Block::new().with(Operation::call(
        Some(Operation::var("o")),
        "greet",
        vec![Operation::integer(1), Operation::integer(2)],
    )));

    assert_eq!(
        opcodes(&program),
        vec![
            OpCode::LoadName,
            OpCode::ResolveDirect,
            OpCode::Dereference,
            OpCode::Duplicate,
            OpCode::LoadName,
            OpCode::ResolveScoped,
            OpCode::Dereference,
            OpCode::Copy,
            OpCode::LoadLiteral,
            OpCode::LoadLiteral,
            OpCode::Evaluate,
            OpCode::EndStatement,
            OpCode::Return,
        ]
    );
    assert_eq!(program.bytecode.instructions[10].operand, 2);
}

#[test]
fn test_compile_ask_with_prompt() {
    let program = compile_ok(Block::new().with(Operation::ask(Some(Operation::string("Name?")))));
    assert_eq!(
        program.bytecode.instructions,
        vec![
            op(OpCode::LoadLiteral, 3),
            op(OpCode::Syscall, 0),
            op(OpCode::EndStatement, 0),
            op(OpCode::Syscall, 1),
            op(OpCode::EndStatement, 0),
            op(OpCode::Return, 0),
        ]
    );
}

#[test]
fn test_compile_new_and_index() {
    let program = compile_ok(
        Block::new()
            .with(Operation::new_object(Operation::var("Object")))
            .with(Operation::index(Operation::var("a"), Operation::integer(0))),
    );
    let code = opcodes(&program);
    assert_eq!(&code[..3], &[OpCode::LoadLiteral, OpCode::Copy, OpCode::EndStatement]);
    assert!(code.contains(&OpCode::ArrayIndex));
}

#[test]
fn test_compile_extends_large_operands() {
    let mut block = Block::new();
    for i in 0..300 {
        block = block.with(
            Operation::assign(Operation::var(format!("v{}", i)), Operation::integer(i)).at_line(i as usize + 1),
        );
    }
    let program = compile_ok(block);

    let last = program.bytecode.lines[299];
    assert_eq!(last.line, 300);
    let code = &program.bytecode.instructions;
    assert_eq!(code[last.offset], op(OpCode::ExtendArgument, 1));
    assert_eq!(code[last.offset + 1], op(OpCode::LoadName, 43));
}

#[test]
fn test_compile_line_table() {
    let program = compile_ok(
        Block::new()
            .with(Operation::print(Operation::integer(1)).at_line(3))
            .with(Operation::print(Operation::integer(2)).at_line(7)),
    );
    assert_eq!(program.bytecode.line_for(0), Some(3));
    assert_eq!(program.bytecode.line_for(3), Some(7));
}

#[test]
fn test_compile_tuple_as_value_fails() {
    let result = compile_program(Block::new().with(Operation::new(
        OperationType::Tuple,
        vec![Operation::integer(1)],
    )));
    assert!(matches!(result, Err(CompileError::MisplacedTuple { .. })));
}

#[test]
fn test_compile_dangling_else_fails() {
    let result = compile_program(
        Block::new()
            .with(Operation::else_clause().at_line(2))
            .with_block(Block::new()),
    );
    assert!(matches!(result, Err(CompileError::DanglingClause { line: 2, .. })));
}

#[test]
fn test_compile_method_without_body_fails() {
    let result = compile_program(Block::new().with(Operation::define(Operation::var("f"), &[]).at_line(1)));
    assert!(matches!(result, Err(CompileError::MissingMethodBody { line: 1 })));
}

#[test]
fn test_compile_wrong_operand_count_fails() {
    let result = compile_program(Block::new().with(Operation::new(
        OperationType::Assign,
        vec![Operation::var("a")],
    )));
    assert!(matches!(
        result,
        Err(CompileError::OperandCount { expected: 2, found: 1, .. })
    ));
}

#[test]
fn test_compile_body_past_placeholder_reach_fails() {
    // A jump reserved near the start reaches at most offset 65535.
    let mut body = Block::new();
    for _ in 0..20_000 {
        body = body.with(Operation::print(Operation::var("x")));
    }
    let result = compile_program(
        Block::new()
            .with(Operation::if_clause(Operation::boolean(true)))
            .with_block(body),
    );

    assert!(matches!(
        result,
        Err(CompileError::JumpTargetOverflow { at: 1, target }) if target > 65_535
    ));
}
