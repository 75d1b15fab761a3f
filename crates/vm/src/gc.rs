//! Root discovery for the collector.
//!
//! The heap can trace object-to-object edges on its own; only the VM knows
//! which objects are roots. Roots are everything a paused program could
//! still name: values on the stack, the global table, the closure of every
//! live frame, and the cells of open upvalues.

use slotmap::SecondaryMap;

use basalt_bytecode::ObjRef;

use crate::vm::Vm;

/// Every object reachable from the VM's roots.
pub(crate) fn reachable(vm: &Vm) -> SecondaryMap<ObjRef, ()> {
    vm.heap.reachable(roots(vm))
}

fn roots(vm: &Vm) -> Vec<ObjRef> {
    let mut roots = Vec::new();
    roots.extend(vm.stack.iter().filter_map(|v| v.as_obj()));
    for (key, value) in vm.globals.iter() {
        roots.push(key);
        roots.extend(value.as_obj());
    }
    roots.extend(vm.frames.iter().map(|frame| frame.closure));
    roots.extend(vm.open_upvalues.iter().map(|open| open.cell));
    roots
}
