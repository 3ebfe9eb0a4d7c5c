//! The scheduling unit (spec section 3).
//!
//! The teacher splits `Process` (capability space, address space, thread
//! table) from `Thread` (register context, kernel stack) from a third,
//! never-wired-up `Task` in `sched::task`. `fork()` in this kernel always
//! creates a brand new address space -- nothing here shares memory between
//! two schedulable entities the way a POSIX thread would -- so the
//! three-way split has no work left to do. `Task` is the single source of
//! truth: credentials, file descriptor table, signal state, and the saved
//! register context all live on one struct, keyed by `TaskId` in the
//! global table in `sched::mod`.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::fs::file::FileTable;
use crate::mm::vas::VirtualAddressSpace;
use crate::signal::SignalState;
use crate::sync::Spinlock;

/// Identifies both the schedulable entity and, since address spaces are
/// never shared, the POSIX process: the `pid` returned by `getpid()` is a
/// `TaskId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl core::fmt::Display for TaskId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

pub fn alloc_task_id() -> TaskId {
    TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Creating,
    Ready,
    Running,
    Blocked,
    Sleeping,
    Zombie,
    Dead,
}

/// Scheduling priority (spec section 3): lower numbers run first. Keeps the
/// teacher's banded numbering scheme but drops the SMP-only real-time/system
/// split within each band since there is only ever one CPU to run on.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    RealTime = 0,
    System = 30,
    #[default]
    UserNormal = 60,
    Low = 80,
    Idle = 99,
}

pub const PRIORITY_LEVELS: usize = 4;

impl Priority {
    /// Bucket index into the ready queue's fixed-size array of run lists.
    pub fn bucket(self) -> usize {
        match self {
            Priority::RealTime => 0,
            Priority::System => 1,
            Priority::UserNormal => 2,
            Priority::Low | Priority::Idle => 3,
        }
    }
}

/// Task statistics
#[derive(Debug, Default)]
pub struct TaskStats {
    pub runtime: AtomicU64,
    pub run_count: AtomicU64,
    pub voluntary_switches: AtomicU64,
    pub involuntary_switches: AtomicU64,
    pub last_run: AtomicU64,
}

/// Saved register context for a 32-bit protected-mode task. Restored by
/// `arch::context::switch_to` on a context switch; pushed by the same on
/// the way out. `cr3` is the physical address of this task's page
/// directory -- reloaded unconditionally on switch since every task has
/// its own address space.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskContext {
    pub edi: u32,
    pub esi: u32,
    pub ebx: u32,
    pub ebp: u32,
    pub esp: u32,
    pub eip: u32,
    pub eflags: u32,
    pub cr3: u32,
}

impl TaskContext {
    pub fn new(entry_point: u32, stack_top: u32, page_directory: u32) -> Self {
        Self {
            esp: stack_top,
            eip: entry_point,
            eflags: 0x202, // IF set
            cr3: page_directory,
            ..Default::default()
        }
    }
}

/// Process credentials (spec section 3): real/effective/saved uid and gid,
/// checked by filesystem permission bits and by `kill()`'s sender check.
#[derive(Debug, Clone, Copy)]
pub struct Credentials {
    pub uid: u32,
    pub euid: u32,
    pub suid: u32,
    pub gid: u32,
    pub egid: u32,
    pub sgid: u32,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            uid: 0,
            euid: 0,
            suid: 0,
            gid: 0,
            egid: 0,
            sgid: 0,
        }
    }
}

/// The scheduling unit. One per live process; there is no separate
/// thread-control-block since `fork` always allocates a fresh address
/// space.
pub struct Task {
    pub id: TaskId,
    pub parent: Option<TaskId>,
    pub children: Spinlock<Vec<TaskId>>,
    pub name: String,

    pub state: Spinlock<TaskState>,
    pub priority: Priority,
    pub time_slice: u32,
    pub vruntime: u64,
    pub stats: TaskStats,

    pub context: Spinlock<TaskContext>,
    pub kernel_stack: usize,
    pub address_space: Spinlock<VirtualAddressSpace>,

    pub credentials: Spinlock<Credentials>,
    pub files: Arc<FileTable>,
    pub cwd: Spinlock<String>,
    pub signals: SignalState,

    /// Set by `exit()`, read by the parent's `wait4()`.
    pub exit_code: Spinlock<Option<i32>>,
}

impl Task {
    pub fn new(
        id: TaskId,
        parent: Option<TaskId>,
        name: String,
        address_space: VirtualAddressSpace,
        kernel_stack: usize,
    ) -> Self {
        Self {
            id,
            parent,
            children: Spinlock::new(Vec::new()),
            name,
            state: Spinlock::new(TaskState::Creating),
            priority: Priority::default(),
            time_slice: DEFAULT_TIME_SLICE,
            vruntime: 0,
            stats: TaskStats::default(),
            context: Spinlock::new(TaskContext::default()),
            kernel_stack,
            address_space: Spinlock::new(address_space),
            credentials: Spinlock::new(Credentials::default()),
            files: Arc::new(FileTable::new()),
            cwd: Spinlock::new(String::from("/")),
            signals: SignalState::new(),
            exit_code: Spinlock::new(None),
        }
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TaskState) {
        *self.state.lock() = state;
    }

    pub fn update_runtime(&self, ticks: u64) {
        self.stats.runtime.fetch_add(ticks, Ordering::Relaxed);
        self.stats
            .last_run
            .store(crate::arch::timer::get_ticks(), Ordering::Relaxed);
    }

    pub fn mark_scheduled(&self, voluntary: bool) {
        self.stats.run_count.fetch_add(1, Ordering::Relaxed);
        if voluntary {
            self.stats
                .voluntary_switches
                .fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats
                .involuntary_switches
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub const DEFAULT_TIME_SLICE: u32 = 10;
pub const PRIORITY_BOOST_INTERVAL: u64 = 100;
