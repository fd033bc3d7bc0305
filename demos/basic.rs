//! Basic usage of a TCP-based `gdbstub`: a dummy x86 target whose
//! "program" is a run of NOP bytes terminated by an `int3` breakpoint.
//!
//! Run with `cargo run --example basic` (after moving this file under
//! an `[[example]]` path) and attach with
//! `gdb -ex "target remote localhost:9001"`.

extern crate env_logger;
extern crate rsp_stub;

use std::net::TcpListener;

use rsp_stub::{read_le, write_le, Arch, GdbStub, RegisterClass, RegisterInfo, RunState, Target};

const MEMORY: &[u8] = &[
    0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, // 0x07
    0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, // 0x0f
    0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, // 0x17
    0xCC, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, // 0x1f (int3 at 0x18)
];

/// Register indices into `DummyTarget::REGS`, matching the order GDB's
/// i386 core feature expects for `g`/`p <n>`.
const EIP_INDEX: usize = 8;

static REGS: &[RegisterInfo] = &[
    RegisterInfo::new("eax", 32, RegisterClass::General),
    RegisterInfo::new("ecx", 32, RegisterClass::General),
    RegisterInfo::new("edx", 32, RegisterClass::General),
    RegisterInfo::new("ebx", 32, RegisterClass::General),
    RegisterInfo::new("esp", 32, RegisterClass::StackPointer),
    RegisterInfo::new("ebp", 32, RegisterClass::General),
    RegisterInfo::new("esi", 32, RegisterClass::General),
    RegisterInfo::new("edi", 32, RegisterClass::General),
    RegisterInfo::new("eip", 32, RegisterClass::ProgramCounter),
];

/// This struct implements the debugger's view of our target system.
struct DummyTarget {
    regs: [u32; REGS.len()],
    mem: Vec<u8>,
    state: RunState,
}

impl Target for DummyTarget {
    type Error = ();

    fn arch(&self) -> Arch {
        Arch::X86
    }

    fn register_info(&self) -> &'static [RegisterInfo] {
        REGS
    }

    fn run_state(&self) -> RunState {
        self.state
    }

    fn stop(&mut self) {
        self.state = RunState::Stopped;
    }

    fn resume(&mut self) {
        self.state = RunState::Running;
        loop {
            let eip = self.regs[EIP_INDEX] as usize;
            match self.mem.get(eip) {
                Some(0x90) => self.regs[EIP_INDEX] += 1,
                Some(0xCC) => {
                    eprintln!("hit breakpoint at {:#010x}, returning to debugger", eip);
                    break;
                }
                Some(invalid) => {
                    eprintln!("invalid opcode {:#04x} at {:#010x}", invalid, eip);
                    break;
                }
                None => {
                    eprintln!("ran off the end of memory at {:#010x}", eip);
                    break;
                }
            }
        }
        self.state = RunState::Stopped;
    }

    fn single_step(&mut self) {
        let eip = self.regs[EIP_INDEX] as usize;
        if self.mem.get(eip) == Some(&0x90) {
            self.regs[EIP_INDEX] += 1;
        }
        self.state = RunState::Stopped;
    }

    fn read_memory(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), ()> {
        let start = addr as usize;
        let end = start.checked_add(buf.len()).ok_or(())?;
        let src = self.mem.get(start..end).ok_or(())?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<(), ()> {
        let start = addr as usize;
        let end = start.checked_add(data.len()).ok_or(())?;
        let dst = self.mem.get_mut(start..end).ok_or(())?;
        dst.copy_from_slice(data);
        Ok(())
    }

    fn read_registers(&mut self, indices: &[usize], out: &mut [u8]) -> Result<(), ()> {
        let mut pos = 0;
        for &idx in indices {
            let value = *self.regs.get(idx).ok_or(())?;
            write_le(value as u64, &mut out[pos..pos + 4]);
            pos += 4;
        }
        Ok(())
    }

    fn write_registers(&mut self, indices: &[usize], data: &[u8]) -> Result<(), ()> {
        let mut pos = 0;
        for &idx in indices {
            let value = read_le(&data[pos..pos + 4]) as u32;
            *self.regs.get_mut(idx).ok_or(())? = value;
            pos += 4;
        }
        Ok(())
    }
}

fn main() {
    env_logger::init();

    let (stream, addr) = TcpListener::bind("127.0.0.1:9001").unwrap().accept().unwrap();
    println!("incoming connection from {}", addr);

    let mut regs = [0u32; REGS.len()];
    regs[EIP_INDEX] = 0x10;
    let target = DummyTarget {
        regs,
        mem: MEMORY.to_vec(),
        state: RunState::Stopped,
    };

    let stub = GdbStub::new(stream, target);
    match stub.run() {
        Ok(reason) => println!("debugger disconnected: {:?}", reason),
        Err(e) => eprintln!("lost debugger connection: {}", e),
    }
}
