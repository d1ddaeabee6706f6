use gsmc::{
    CompileOptions, analyze, compile,
    error::{CompileError, LoweringError},
    frontend::SourceFile,
    middle::ir::{
        self,
        interpret::{Execution, InterpretOptions, interpret},
        pretty_print::to_plain_string,
    },
};
use indoc::indoc;

fn compile_text(text: &str, options: &CompileOptions) -> Result<ir::Module, CompileError> {
    compile(&SourceFile::in_memory(text), options)
}

fn execute(text: &str, options: &CompileOptions) -> Execution {
    let module = compile_text(text, options).expect("program should compile");

    interpret(&module, &InterpretOptions::default()).expect("program should run")
}

fn writes(text: &str) -> Vec<i32> {
    execute(text, &CompileOptions::default()).writes
}

fn writes_unoptimized(text: &str) -> Vec<i32> {
    let options = CompileOptions {
        optimize: false,
        ..CompileOptions::default()
    };

    execute(text, &options).writes
}

fn optimized_source(text: &str) -> String {
    analyze(&SourceFile::in_memory(text), &CompileOptions::default())
        .expect("program should analyze")
        .to_string()
}

#[test]
fn declaration_then_read_writes_twice() {
    assert_eq!(writes("int a = 7; result = a;"), [7, 7]);
}

#[test]
fn compound_assignment_updates_the_same_cell() {
    assert_eq!(
        writes_unoptimized("int a = 10; a += 3; result = a;"),
        [10, 13, 13]
    );
}

#[test]
fn multiplying_and_dividing_compound_assignments() {
    assert_eq!(
        writes("int a = 6; a *= 7; a /= 4; result = a;"),
        [6, 42, 10, 10]
    );
    assert_eq!(writes("result = 0 - 7; result /= 2;"), [-7, -3]);
}

#[test]
fn multi_name_declaration_writes_once_per_name() {
    assert_eq!(writes_unoptimized("int a, b = 3;"), [3, 3]);
    assert!(writes_unoptimized("int a, b;").is_empty());
    assert_eq!(writes("int a, b = 3; result = a + b;"), [3, 3, 6]);
}

#[test]
fn chained_powers_group_to_the_right() {
    assert_eq!(writes("result = 2 ^ 3 ^ 2;"), [512]);
    assert_eq!(writes("result = (2 ^ 3) ^ 2;"), [64]);

    let error = compile_text("int a = 2; result = 2 ^ a ^ 2;", &CompileOptions::default())
        .expect_err("exponent depends on a variable");

    assert!(matches!(
        error,
        CompileError::Lowering(LoweringError::NonLiteralExponent { .. })
    ));
}

#[test]
fn overly_deep_expressions_are_syntax_errors() {
    let text = format!("result = 1{};", " + 1".repeat(10_000));
    let error = compile_text(&text, &CompileOptions::default()).expect_err("too deep");

    assert!(matches!(error, CompileError::Syntax(_)));
}

#[test]
fn conditional_runs_one_branch() {
    assert_eq!(
        writes("if 1 > 0: begin result = 1; end else: begin result = 0; end"),
        [1]
    );
}

#[test]
fn logical_and_of_literals() {
    assert_eq!(writes("result = 1 and 0;"), [0]);
    assert_eq!(writes("result = 0 or 0 or 3;"), [1]);
}

#[test]
fn malformed_declaration_produces_no_module() {
    let error = compile_text("int ;", &CompileOptions::default())
        .expect_err("`int ;` must not compile");

    assert!(matches!(error, CompileError::Syntax(_)));
    assert_eq!(error.summary(), "Syntax errors occurred");
}

#[test]
fn dead_code_examples() {
    assert_eq!(
        optimized_source("int x = 2 + 3 * 4; result = x;"),
        "int x = 2 + (3 * 4);\nresult = x;\n"
    );
    assert_eq!(optimized_source("int y = 5; result = 1;"), "result = 1;\n");
}

#[test]
fn dead_code_removal_drops_observations_of_unused_values() {
    let text = "int y = 5; int z = y * 2; result = 1;";

    assert_eq!(writes_unoptimized(text), [5, 10, 1]);
    assert_eq!(writes(text), [1]);
}

#[test]
fn optimization_keeps_what_the_sentinel_observes() {
    let text = indoc! {"
        int base = 3;
        int noise = 100;
        int square = base ^ 2;
        noise += 1;
        int total = square + base;
        result = total % 5;
    "};

    let optimized = writes(text);
    let unoptimized = writes_unoptimized(text);

    assert_eq!(optimized.last(), Some(&2));
    assert_eq!(unoptimized.last(), optimized.last());
    assert!(optimized.len() < unoptimized.len());
}

#[test]
fn loop_accumulates() {
    let text = indoc! {"
        int i = 1;
        int sum = 0;
        loopc i <= 4: begin
            sum += i;
            i += 1;
        end
        result = sum;
    "};

    assert_eq!(writes(text).last(), Some(&10));
}

#[test]
fn unknown_names_are_semantic_errors() {
    let error = compile_text("result = missing + 1;", &CompileOptions::default())
        .expect_err("undeclared name");

    assert_eq!(error.summary(), "Semantic errors occurred");
    assert_eq!(error.diagnostics().len(), 1);
}

#[test]
fn removed_declarations_do_not_hide_undeclared_names() {
    // `a` is only read by dead code, so the read of `b` is never checked
    assert!(compile_text("int a = b; result = 1;", &CompileOptions::default()).is_ok());

    let options = CompileOptions {
        optimize: false,
        ..CompileOptions::default()
    };
    assert!(compile_text("int a = b; result = 1;", &options).is_err());
}

#[test]
fn non_literal_exponent_fails_code_generation() {
    let error = compile_text("int a = 2; result = 2 ^ a;", &CompileOptions::default())
        .expect_err("non literal exponent");

    assert!(matches!(
        error,
        CompileError::Lowering(LoweringError::NonLiteralExponent { .. })
    ));
    assert_eq!(error.summary(), "Code generation failed");
}

#[test]
fn custom_sentinel_and_module_name() {
    let options = CompileOptions {
        sentinel: "out".to_owned(),
        module_name: "demo".to_owned(),
        ..CompileOptions::default()
    };

    let module = compile_text("int unused = 1; out = 4;", &options).expect("should compile");
    let printed = to_plain_string(&module);

    assert!(printed.starts_with("; module demo\n"));
    assert!(printed.contains("$out = alloc i32"));
    assert!(!printed.contains("unused"));
    assert_eq!(
        interpret(&module, &InterpretOptions::default())
            .expect("program should run")
            .writes,
        [4]
    );
}

#[test]
fn entry_procedure_returns_zero() {
    let execution = execute("result = 0 - 9;", &CompileOptions::default());

    assert_eq!(execution.writes, [-9]);
    assert_eq!(execution.return_value, 0);
}
