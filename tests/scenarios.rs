//! End-to-end programs: assemble, load, run, inspect.

use rv16::asm::{load_binary, save_binary};
use rv16::error::Access;
use rv16::{assemble, Cpu, CpuState, ErrorPolicy, SimConfig, SimError};

fn build(source: &str) -> Vec<u16> {
    let assembly = assemble(source);
    assert!(assembly.is_ok(), "assembly errors: {:?}", assembly.errors);
    assembly.words
}

fn run_source(source: &str) -> Cpu {
    let mut cpu = Cpu::new();
    cpu.load_program(&build(source)).unwrap();
    assert_eq!(cpu.run(1000), Ok(true), "program did not halt");
    cpu
}

const COUNTDOWN: &str = r#"
# count a0 down from 5 to 0
        addi t0, zero, 1
        addi a0, zero, 5
loop:   sub  a0, a0, t0
        bne  a0, zero, loop
        halt
"#;

#[test]
fn add_two_immediates() {
    let cpu = run_source("addi x1, x0, 10\naddi x2, x0, 5\nadd x3, x1, x2\nhalt\n");
    assert_eq!(cpu.register(3), 15);
    assert!(cpu.is_halted());
    assert_eq!(cpu.cycles(), 4);
}

#[test]
fn store_then_load() {
    let cpu = run_source("addi x1, x0, 9\nsw x1, 0(x0)\nlw x2, 0(x0)\nhalt\n");
    assert_eq!(cpu.register(2), 9);
    assert_eq!(cpu.data_non_zero(), vec![(0x1000, 9)]);
}

#[test]
fn label_loop_is_deterministic() {
    let first = run_source(COUNTDOWN);
    assert_eq!(first.cycles(), 13);
    assert_eq!(first.register(10), 0);
    assert_eq!(first.register(5), 1);
    assert_eq!(first.stats().branches_taken, 4);
    assert_eq!(first.stats().branches_not_taken, 1);

    let second = run_source(COUNTDOWN);
    assert_eq!(first.registers(), second.registers());
    assert_eq!(first.cycles(), second.cycles());
}

#[test]
fn jal_call_and_return() {
    let cpu = run_source(
        r#"
                addi a0, zero, 2
                jal  ra, double
        done:   halt
        double: add  a0, a0, a0
                jal  zero, done
        "#,
    );
    assert_eq!(cpu.register(10), 4);
    assert_eq!(cpu.register(1), 2);
    assert_eq!(cpu.register(0), 0);
    assert_eq!(cpu.pc(), 2);
}

#[test]
fn register_zero_stays_zero() {
    let mut cpu = Cpu::new();
    assert!(!cpu.regs.write(0, 123));
    assert_eq!(cpu.register(0), 0);

    let cpu = run_source("addi x0, x0, 5\nadd zero, x0, x0\njal x0, 1\nhalt\n");
    assert_eq!(cpu.register(0), 0);
}

#[test]
fn out_of_range_data_graceful() {
    let config = SimConfig { dmem_size: 16, ..SimConfig::default() };
    let mut cpu = Cpu::with_config(config).unwrap();
    let program = build(
        r#"
        addi x3, x0, 7
        sw   x3, 15(x0)     # last valid word
        addi x5, x0, 8
        add  x5, x5, x5     # x5 = 16, one past the end
        lw   x2, 0(x5)
        sw   x3, 1(x5)
        halt
        "#,
    );
    cpu.load_program(&program).unwrap();
    assert_eq!(cpu.run(100), Ok(true));

    assert_eq!(cpu.register(2), 0);
    assert_eq!(cpu.data_non_zero(), vec![(0x100F, 7)]);
    assert_eq!(cpu.errors().total(), 2);
    assert!(cpu.dmem.read_word(0x0FFF).is_err());
}

#[test]
fn out_of_range_data_strict() {
    let config = SimConfig { dmem_size: 16, policy: ErrorPolicy::Strict, ..SimConfig::default() };
    let mut cpu = Cpu::with_config(config).unwrap();
    cpu.load_program(&build("addi x5, x0, 8\nadd x5, x5, x5\nlw x2, 0(x5)\nhalt\n")).unwrap();

    let err = cpu.run(100).unwrap_err();
    assert_eq!(err, SimError::MemoryFault { addr: 0x1010, access: Access::Read, pc: Some(2) });
    assert_eq!(cpu.pc(), 2);
    assert_eq!(cpu.register(2), 0);
    assert!(!cpu.is_halted());
}

#[test]
fn watchdog_stops_infinite_loop() {
    let mut cpu = Cpu::new();
    cpu.load_program(&build("spin: beq x0, x0, spin\n")).unwrap();
    assert_eq!(cpu.run(25), Ok(false));
    assert_eq!(cpu.cycles(), 25);
    assert_eq!(cpu.state(), CpuState::Running);
}

#[test]
fn reset_and_reload_is_idempotent() {
    let words = build(COUNTDOWN);
    let mut cpu = Cpu::new();
    cpu.load_program(&words).unwrap();
    cpu.run(1000).unwrap();
    let snapshot = cpu.snapshot();
    let trace: Vec<_> = cpu.history().cloned().collect();

    cpu.reset();
    cpu.load_program(&words).unwrap();
    cpu.load_program(&words).unwrap();
    assert_eq!(cpu.state(), CpuState::Ready);
    assert_eq!(cpu.cycles(), 0);
    cpu.run(1000).unwrap();

    assert_eq!(cpu.snapshot(), snapshot);
    assert_eq!(cpu.history().cloned().collect::<Vec<_>>(), trace);
}

#[test]
fn bad_lines_do_not_stop_assembly() {
    let assembly = assemble("addi x1, x0, 1\nfoo x1\naddi x2, x0, 99\nhalt\n");
    assert_eq!(assembly.errors.len(), 2);
    assert_eq!(assembly.words.len(), 2);

    let mut cpu = Cpu::new();
    cpu.load_program(&assembly.words).unwrap();
    assert_eq!(cpu.run(10), Ok(true));
    assert_eq!(cpu.register(1), 1);

    let err: SimError = assembly.errors[0].clone().into();
    assert!(matches!(err, SimError::InvalidOperand { line: 2, .. }));
}

#[test]
fn program_larger_than_memory_is_rejected() {
    let config = SimConfig::default().with_memory(8, 16);
    let mut cpu = Cpu::with_config(config).unwrap();
    let err = cpu.load_program(&[0xE000; 9]).unwrap_err();
    assert_eq!(err, SimError::CapacityExceeded { size: 9, capacity: 8 });
}

#[test]
fn binary_image_runs_after_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("countdown.bin");
    save_binary(&path, &build(COUNTDOWN)).unwrap();

    let mut cpu = Cpu::new();
    cpu.load_program(&load_binary(&path).unwrap()).unwrap();
    assert_eq!(cpu.run(1000), Ok(true));
    assert_eq!(cpu.cycles(), 13);
}

#[test]
fn config_file_sets_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sim.json");
    std::fs::write(&path, r#"{ "policy": "strict", "max_cycles": 5 }"#).unwrap();

    let config = SimConfig::from_json_file(&path).unwrap();
    let mut cpu = Cpu::with_config(config).unwrap();
    assert_eq!(cpu.policy(), ErrorPolicy::Strict);

    cpu.load_program(&build("spin: beq x0, x0, spin\n")).unwrap();
    assert_eq!(cpu.run_default(), Ok(false));
    assert_eq!(cpu.cycles(), 5);
}

#[test]
fn snapshot_serializes() {
    let cpu = run_source("addi x1, x0, 3\nhalt\n");
    let json = serde_json::to_value(cpu.snapshot()).unwrap();
    assert_eq!(json["registers"][1], 3);
    assert_eq!(json["state"], "Halted");
}
