//! CPU execution engine for RV16.
//!
//! Implements the fetch-decode-control-execute cycle. One call to
//! [`Cpu::step`] runs exactly one instruction; [`Cpu::run`] repeats it
//! under a cycle budget so a program that never halts still returns.

use std::collections::VecDeque;
use std::fmt;
use serde::{Serialize, Deserialize};
use tracing::{debug, info, trace};

use crate::config::SimConfig;
use crate::cpu::alu::{Alu, Flags};
use crate::cpu::control::{ControlSignals, ControlUnit, OperandSource, WriteBackSource};
use crate::cpu::decode::{decode, Instruction};
use crate::cpu::diagnostics::{ErrorHandler, ErrorPolicy};
use crate::cpu::memory::{DataMemory, InstructionMemory};
use crate::cpu::registers::RegisterFile;
use crate::error::SimError;
use crate::isa::{Format, NUM_REGISTERS};

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// Freshly reset or loaded; nothing executed yet.
    Ready,
    /// At least one instruction has executed.
    Running,
    /// Stopped by HALT or by running off the end of the program.
    Halted,
}

impl fmt::Display for CpuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CpuState::Ready => "READY",
            CpuState::Running => "RUNNING",
            CpuState::Halted => "HALTED",
        })
    }
}

/// One entry of the execution history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub cycle: u64,
    pub pc: u16,
    pub word: u16,
    pub assembly: String,
    pub format: Option<Format>,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6}  {:04X}: {:04X}  {}", self.cycle, self.pc, self.word, self.assembly)
    }
}

/// Execution counters beyond the cycle and instruction totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecStats {
    pub r_type: u64,
    pub i_type: u64,
    pub s_type: u64,
    pub b_type: u64,
    pub j_type: u64,
    pub special: u64,
    pub branches_taken: u64,
    pub branches_not_taken: u64,
    pub memory_reads: u64,
    pub memory_writes: u64,
}

impl ExecStats {
    fn count(&mut self, format: Format) {
        let slot = match format {
            Format::R => &mut self.r_type,
            Format::I => &mut self.i_type,
            Format::S => &mut self.s_type,
            Format::B => &mut self.b_type,
            Format::J => &mut self.j_type,
            Format::Special => &mut self.special,
        };
        *slot += 1;
    }
}

/// Serializable view of the architectural state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub pc: u16,
    pub state: CpuState,
    pub cycles: u64,
    pub instructions: u64,
    pub registers: [u16; NUM_REGISTERS],
    pub flags: Flags,
    /// Non-zero data words as `(address, value)`.
    pub data: Vec<(u32, u16)>,
    pub stats: ExecStats,
    pub errors: u64,
}

impl fmt::Display for CpuSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "State: {}  PC: {:#06x}  Flags: {}", self.state, self.pc, self.flags)?;
        writeln!(f, "Cycles: {}  Instructions: {}  Errors: {}", self.cycles, self.instructions, self.errors)?;
        writeln!(f, "Registers:")?;
        for (i, value) in self.registers.iter().enumerate().filter(|(_, &v)| v != 0) {
            writeln!(f, "  x{i:<2} = {value:#06x} ({value})")?;
        }
        if !self.data.is_empty() {
            writeln!(f, "Data memory:")?;
            for (addr, value) in &self.data {
                writeln!(f, "  [{addr:#06x}] = {value:#06x} ({value})")?;
            }
        }
        Ok(())
    }
}

/// Outcome of the execute stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Jump(u16),
    Halt,
}

/// The RV16 CPU.
#[derive(Debug, Clone)]
pub struct Cpu {
    /// General-purpose registers.
    pub regs: RegisterFile,
    /// Arithmetic logic unit.
    pub alu: Alu,
    /// Program store.
    pub imem: InstructionMemory,
    /// Data store.
    pub dmem: DataMemory,
    /// Control signal generator.
    pub control: ControlUnit,
    pc: u16,
    state: CpuState,
    cycles: u64,
    instructions: u64,
    history: VecDeque<TraceEntry>,
    stats: ExecStats,
    errors: ErrorHandler,
    config: SimConfig,
}

impl Cpu {
    /// Create a CPU with the default configuration.
    pub fn new() -> Self {
        Self::build(SimConfig::default())
    }

    /// Create a CPU from a validated configuration.
    pub fn with_config(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SimConfig) -> Self {
        Self {
            regs: RegisterFile::new(),
            alu: Alu::new(),
            imem: InstructionMemory::new(config.imem_size),
            dmem: DataMemory::new(config.dmem_size, config.dmem_base),
            control: ControlUnit::new(),
            pc: 0,
            state: CpuState::Ready,
            cycles: 0,
            instructions: 0,
            history: VecDeque::new(),
            stats: ExecStats::default(),
            errors: ErrorHandler::new(config.policy, config.error_log_capacity),
            config,
        }
    }

    /// Reset to the initial state. The loaded program is kept.
    pub fn reset(&mut self) {
        self.regs.reset_all();
        self.alu.reset();
        self.dmem.clear();
        self.control.reset();
        self.pc = 0;
        self.state = CpuState::Ready;
        self.cycles = 0;
        self.instructions = 0;
        self.history.clear();
        self.stats = ExecStats::default();
        self.errors.clear();
        debug!("cpu reset");
    }

    /// Load a program at address 0.
    pub fn load_program(&mut self, program: &[u16]) -> Result<(), SimError> {
        self.load_program_at(program, 0)
    }

    /// Load a program at `start` and point the PC at it.
    ///
    /// A program that does not fit is rejected under either policy and
    /// leaves instruction memory untouched.
    pub fn load_program_at(&mut self, program: &[u16], start: usize) -> Result<(), SimError> {
        if let Err(err) = self.imem.load_program(program, start) {
            self.errors.record(&err);
            return Err(err);
        }
        self.pc = start as u16;
        self.state = CpuState::Ready;
        debug!(words = program.len(), start, "program ready");
        Ok(())
    }

    /// Execute one instruction.
    ///
    /// Returns `Ok(true)` while the CPU can keep going and `Ok(false)` once
    /// it has halted. Under the strict policy a fault is returned as an
    /// error and the PC and counters are left as they were.
    pub fn step(&mut self) -> Result<bool, SimError> {
        if self.state == CpuState::Halted {
            return Ok(false);
        }
        let pc = self.pc;

        // Fetch. Running off the loaded image ends the program under
        // either policy, even when it ends flush with instruction memory.
        let past_end = usize::from(pc) >= self.imem.program_end();
        let word = match self.imem.read_instruction(pc) {
            Ok(word) => word,
            Err(_) if past_end => 0,
            Err(fault) => self.errors.handle(fault, 0)?,
        };
        if word == 0 && past_end {
            self.halt("end of program");
            return Ok(false);
        }

        // Decode and control
        let instr = decode(word);
        let signals = self.control.generate_control_signals(&instr);

        // Execute
        let flow = match instr {
            Instruction::Invalid { word } => {
                self.errors.handle(SimError::InvalidInstruction { word, pc }, ())?;
                Flow::Next
            }
            _ => self.execute(&instr, &signals, pc)?,
        };

        // PC update
        match flow {
            Flow::Next => self.pc = pc.wrapping_add(1),
            Flow::Jump(target) => self.pc = target,
            Flow::Halt => {}
        }

        // Bookkeeping
        self.cycles += 1;
        if let Some(format) = instr.format() {
            self.instructions += 1;
            self.stats.count(format);
        }
        self.record(pc, word, &instr);
        trace!(cycle = self.cycles, pc, word, "{instr}");

        if flow == Flow::Halt {
            self.halt("HALT");
            return Ok(false);
        }
        self.state = CpuState::Running;
        Ok(true)
    }

    /// Run until halted or until `max_cycles` steps have executed.
    ///
    /// Returns `Ok(true)` on a normal halt and `Ok(false)` when the budget
    /// ran out first.
    pub fn run(&mut self, max_cycles: u64) -> Result<bool, SimError> {
        let mut executed = 0;
        while executed < max_cycles {
            if !self.step()? {
                return Ok(true);
            }
            executed += 1;
        }
        if self.is_halted() {
            return Ok(true);
        }
        info!(max_cycles, pc = self.pc, "cycle budget exhausted");
        Ok(false)
    }

    /// Run with the configured cycle budget.
    pub fn run_default(&mut self) -> Result<bool, SimError> {
        self.run(self.config.max_cycles)
    }

    fn execute(&mut self, instr: &Instruction, signals: &ControlSignals, pc: u16) -> Result<Flow, SimError> {
        let flow = match *instr {
            Instruction::R { rd, rs1, rs2, .. } => {
                let result = self.alu_stage(signals, rs1, rs2, 0);
                self.write_back(signals, rd, result, pc);
                Flow::Next
            }
            Instruction::I { rd, rs1, imm, .. } if signals.mem_read => {
                let addr = self.data_address(rs1, imm);
                let value = match self.dmem.read_word(addr) {
                    Ok(value) => {
                        self.stats.memory_reads += 1;
                        value
                    }
                    Err(fault) => self.errors.handle(fault.at_pc(pc), 0)?,
                };
                self.write_back(signals, rd, value, pc);
                Flow::Next
            }
            Instruction::I { rd, rs1, imm, .. } => {
                let result = self.alu_stage(signals, rs1, 0, imm.into());
                self.write_back(signals, rd, result, pc);
                Flow::Next
            }
            Instruction::S { rs2, rs1, offset, .. } => {
                let addr = self.data_address(rs1, offset);
                let value = self.regs.read(rs2.into());
                match self.dmem.write_word(addr, value.into()) {
                    Ok(()) => self.stats.memory_writes += 1,
                    Err(fault) => self.errors.handle(fault.at_pc(pc), ())?,
                }
                Flow::Next
            }
            Instruction::B { rs1, rs2, offset, .. } => {
                if self.alu_stage(signals, rs1, rs2, 0) == 1 {
                    let target = pc.wrapping_add_signed(offset.into());
                    self.stats.branches_taken += 1;
                    debug!(pc, target, "branch taken");
                    Flow::Jump(target)
                } else {
                    self.stats.branches_not_taken += 1;
                    Flow::Next
                }
            }
            Instruction::J { rd, offset, .. } => {
                let target = pc.wrapping_add_signed(offset.into());
                self.write_back(signals, rd, 0, pc);
                debug!(pc, target, "jump");
                Flow::Jump(target)
            }
            Instruction::Special { .. } if signals.should_halt() => Flow::Halt,
            Instruction::Special { .. } | Instruction::Invalid { .. } => Flow::Next,
        };
        Ok(flow)
    }

    /// Run the ALU on `rs1` and either `rs2` or `imm`, as the bundle selects.
    fn alu_stage(&mut self, signals: &ControlSignals, rs1: u8, rs2: u8, imm: u16) -> u16 {
        let Some(op) = signals.alu_op else {
            return 0;
        };
        let a = self.regs.read(rs1.into());
        let b = match signals.alu_src_b {
            Some(OperandSource::Immediate) => imm,
            _ => self.regs.read(rs2.into()),
        };
        self.alu.execute(a.into(), b.into(), op)
    }

    fn write_back(&mut self, signals: &ControlSignals, rd: u8, value: u16, pc: u16) {
        if !signals.reg_write {
            return;
        }
        let value = match signals.reg_write_src {
            Some(WriteBackSource::PcPlusOne) => pc.wrapping_add(1),
            _ => value,
        };
        self.regs.write(rd.into(), value.into());
    }

    /// Logical data address: data base plus the 16-bit effective address.
    fn data_address(&self, rs1: u8, offset: u8) -> u32 {
        let effective = self.regs.read(rs1.into()).wrapping_add(offset.into());
        u32::from(self.dmem.base()) + u32::from(effective)
    }

    fn record(&mut self, pc: u16, word: u16, instr: &Instruction) {
        let capacity = self.config.history_capacity;
        if capacity == 0 {
            return;
        }
        if self.history.len() == capacity {
            self.history.pop_front();
        }
        self.history.push_back(TraceEntry {
            cycle: self.cycles,
            pc,
            word,
            assembly: instr.to_string(),
            format: instr.format(),
        });
    }

    fn halt(&mut self, reason: &str) {
        self.state = CpuState::Halted;
        info!(pc = self.pc, cycles = self.cycles, instructions = self.instructions, "halted: {reason}");
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn state(&self) -> CpuState {
        self.state
    }

    /// Check if CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Validly decoded instructions executed.
    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    pub fn register(&self, index: usize) -> u16 {
        self.regs.read(index)
    }

    pub fn registers(&self) -> [u16; NUM_REGISTERS] {
        self.regs.snapshot()
    }

    pub fn flags(&self) -> Flags {
        self.alu.flags()
    }

    /// Non-zero data words as `(address, value)`.
    pub fn data_non_zero(&self) -> Vec<(u32, u16)> {
        self.dmem.find_non_zero()
    }

    /// Recent execution history, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TraceEntry> {
        self.history.iter()
    }

    pub fn stats(&self) -> &ExecStats {
        &self.stats
    }

    pub fn errors(&self) -> &ErrorHandler {
        &self.errors
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.errors.policy()
    }

    pub fn set_policy(&mut self, policy: ErrorPolicy) {
        self.config.policy = policy;
        self.errors.set_policy(policy);
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            pc: self.pc,
            state: self.state,
            cycles: self.cycles,
            instructions: self.instructions,
            registers: self.registers(),
            flags: self.flags(),
            data: self.data_non_zero(),
            stats: self.stats.clone(),
            errors: self.errors.total(),
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::error::Access;
    use crate::isa::Opcode;

    fn make_program(instructions: &[Instruction]) -> Vec<u16> {
        instructions.iter().map(encode).collect()
    }

    fn addi(rd: u8, rs1: u8, imm: u8) -> Instruction {
        Instruction::I { op: Opcode::Addi, rd, rs1, imm }
    }

    const HALT: Instruction = Instruction::Special { op: Opcode::Halt };

    fn loaded(instructions: &[Instruction]) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.load_program(&make_program(instructions)).unwrap();
        cpu
    }

    #[test]
    fn test_cpu_halt() {
        let mut cpu = loaded(&[HALT]);
        assert_eq!(cpu.state(), CpuState::Ready);
        assert_eq!(cpu.step(), Ok(false));
        assert!(cpu.is_halted());
        assert_eq!(cpu.pc(), 0);
        assert_eq!(cpu.cycles(), 1);
        assert_eq!(cpu.step(), Ok(false));
        assert_eq!(cpu.cycles(), 1);
    }

    #[test]
    fn test_cpu_arithmetic() {
        let mut cpu = loaded(&[
            addi(1, 0, 10),
            addi(2, 0, 5),
            Instruction::R { op: Opcode::Sub, rd: 3, rs1: 2, rs2: 1 },
            HALT,
        ]);
        assert_eq!(cpu.run(100), Ok(true));
        assert_eq!(cpu.register(3), 0xFFFB);
        assert!(cpu.flags().negative);
        assert_eq!(cpu.instructions(), 4);
        assert_eq!(cpu.stats().i_type, 2);
    }

    #[test]
    fn test_cpu_load_store() {
        let mut cpu = loaded(&[
            addi(1, 0, 9),
            Instruction::S { op: Opcode::Sw, rs2: 1, rs1: 0, offset: 2 },
            Instruction::I { op: Opcode::Lw, rd: 2, rs1: 0, imm: 2 },
            HALT,
        ]);
        assert_eq!(cpu.run(100), Ok(true));
        assert_eq!(cpu.register(2), 9);
        assert_eq!(cpu.data_non_zero(), vec![(0x1002, 9)]);
        assert_eq!(cpu.stats().memory_reads, 1);
        assert_eq!(cpu.stats().memory_writes, 1);
    }

    #[test]
    fn test_cpu_branch_without_implicit_increment() {
        // 0: addi x1, x0, 1
        // 1: bne  x1, x0, +2   -> 3
        // 2: addi x2, x0, 7    (skipped)
        // 3: halt
        let mut cpu = loaded(&[
            addi(1, 0, 1),
            Instruction::B { op: Opcode::Bne, rs1: 1, rs2: 0, offset: 2 },
            addi(2, 0, 7),
            HALT,
        ]);
        assert_eq!(cpu.run(100), Ok(true));
        assert_eq!(cpu.register(2), 0);
        assert_eq!(cpu.pc(), 3);
        assert_eq!(cpu.stats().branches_taken, 1);
    }

    #[test]
    fn test_cpu_jal_links() {
        // 0: jal x1, +2 -> 2
        // 1: halt
        // 2: halt
        let mut cpu = loaded(&[Instruction::J { op: Opcode::Jal, rd: 1, offset: 2 }, HALT, HALT]);
        assert_eq!(cpu.step(), Ok(true));
        assert_eq!(cpu.pc(), 2);
        assert_eq!(cpu.register(1), 1);
    }

    #[test]
    fn test_cpu_watchdog() {
        // beq x0, x0, 0 spins forever
        let mut cpu = loaded(&[Instruction::B { op: Opcode::Beq, rs1: 0, rs2: 0, offset: 0 }]);
        assert_eq!(cpu.run(50), Ok(false));
        assert_eq!(cpu.cycles(), 50);
        assert_eq!(cpu.state(), CpuState::Running);
    }

    #[test]
    fn test_cpu_end_of_program() {
        let mut cpu = loaded(&[addi(1, 0, 3)]);
        assert_eq!(cpu.run(100), Ok(true));
        assert!(cpu.is_halted());
        assert_eq!(cpu.cycles(), 1);
        assert_eq!(cpu.register(1), 3);
    }

    #[test]
    fn test_cpu_program_filling_memory_ends_cleanly() {
        let nops = vec![encode(&Instruction::Special { op: Opcode::Nop }); 4];
        for policy in [ErrorPolicy::Graceful, ErrorPolicy::Strict] {
            let config = SimConfig::default().with_memory(4, 16).with_policy(policy);
            let mut cpu = Cpu::with_config(config).unwrap();
            cpu.load_program(&nops).unwrap();
            assert_eq!(cpu.run(10), Ok(true), "{policy:?}");
            assert!(cpu.is_halted());
            assert_eq!(cpu.pc(), 4);
            assert_eq!(cpu.cycles(), 4);
            assert_eq!(cpu.errors().total(), 0);
        }
    }

    #[test]
    fn test_cpu_invalid_instruction_graceful() {
        let mut cpu = Cpu::new();
        cpu.load_program(&[0xD000, encode(&HALT)]).unwrap();
        assert_eq!(cpu.run(10), Ok(true));
        assert_eq!(cpu.cycles(), 2);
        assert_eq!(cpu.instructions(), 1);
        assert_eq!(cpu.errors().total(), 1);
    }

    #[test]
    fn test_cpu_invalid_instruction_strict() {
        let mut cpu = Cpu::new();
        cpu.set_policy(ErrorPolicy::Strict);
        cpu.load_program(&[0xD000, encode(&HALT)]).unwrap();
        assert_eq!(cpu.step(), Err(SimError::InvalidInstruction { word: 0xD000, pc: 0 }));
        assert_eq!(cpu.pc(), 0);
        assert_eq!(cpu.cycles(), 0);
    }

    #[test]
    fn test_cpu_memory_fault_policies() {
        let config = SimConfig { dmem_size: 4, ..SimConfig::default() };
        let program = make_program(&[
            addi(1, 0, 9),
            Instruction::S { op: Opcode::Sw, rs2: 1, rs1: 0, offset: 4 },
            Instruction::I { op: Opcode::Lw, rd: 2, rs1: 0, imm: 4 },
            HALT,
        ]);

        let mut cpu = Cpu::with_config(config.clone()).unwrap();
        cpu.load_program(&program).unwrap();
        assert_eq!(cpu.run(10), Ok(true));
        assert!(cpu.data_non_zero().is_empty());
        assert_eq!(cpu.register(2), 0);
        assert_eq!(cpu.errors().total(), 2);

        let mut cpu = Cpu::with_config(config.with_policy(ErrorPolicy::Strict)).unwrap();
        cpu.load_program(&program).unwrap();
        assert_eq!(cpu.step(), Ok(true));
        assert_eq!(
            cpu.step(),
            Err(SimError::MemoryFault { addr: 0x1004, access: Access::Write, pc: Some(1) })
        );
        assert_eq!(cpu.pc(), 1);
        assert_eq!(cpu.cycles(), 1);
    }

    #[test]
    fn test_cpu_history_bounded() {
        let program = vec![encode(&Instruction::Special { op: Opcode::Nop }); 30];
        let mut cpu = Cpu::new();
        cpu.load_program(&program).unwrap();
        cpu.run(30).unwrap();
        assert_eq!(cpu.history().count(), 20);
        assert_eq!(cpu.history().next().map(|e| e.pc), Some(10));
        assert_eq!(cpu.stats().special, 30);
    }

    #[test]
    fn test_cpu_load_rejects_oversized() {
        let mut cpu = Cpu::with_config(SimConfig::default().with_memory(4, 16)).unwrap();
        assert!(matches!(cpu.load_program(&[0; 5]), Err(SimError::CapacityExceeded { .. })));
        assert_eq!(cpu.errors().total(), 1);
    }

    #[test]
    fn test_cpu_reset_keeps_program() {
        let mut cpu = loaded(&[addi(1, 0, 4), HALT]);
        cpu.run(10).unwrap();
        cpu.reset();
        assert_eq!(cpu.register(1), 0);
        assert_eq!(cpu.state(), CpuState::Ready);
        assert_eq!(cpu.run(10), Ok(true));
        assert_eq!(cpu.register(1), 4);
    }
}
