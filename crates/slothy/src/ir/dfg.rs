//! The data-flow graph and its single-pass builder.
//!
//! One left-to-right pass tracks, per register name, the value currently
//! bound to it. Read slots take an edge from the current producer; write
//! slots bind a fresh value; read-write slots do both in that order. After
//! construction register *names* no longer matter: two nodes depend on each
//! other exactly when an edge connects them, whatever renaming the encoder
//! later picks.

use crate::config::MemPolicy;
use crate::error::{Error, Result};
use crate::ir::entities::{Node, Value};
use crate::ir::instruction::{Instruction, Operand, RegName};
use crate::isa::{ArchModel, MemAccess, Reg, RegClass, Role};
use cranelift_entity::PrimaryMap;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;

/// What a node is.
pub enum NodeKind {
    /// Virtual producer of everything live into the window.
    Source,
    /// Virtual consumer of declared outputs.
    Sink,
    /// A real instruction.
    Inst(Instruction),
}

/// One node of the graph.
pub struct NodeData {
    /// The node's kind.
    pub kind: NodeKind,
    /// Position in the input window; meaningless for virtual nodes.
    pub src_index: usize,
}

/// One value: the contents one write slot puts into a register.
pub struct ValueData {
    /// The producing node.
    pub producer: Node,
    /// The producing operand slot (or source-value ordinal).
    pub slot: u8,
    /// The register name as written.
    pub name: RegName,
    /// The value's register class.
    pub class: RegClass,
    /// Fixed architectural register, when pre-pinned.
    pub pin: Option<Reg>,
    /// The value is a declared output (consumed by the sink).
    pub output: bool,
}

/// Dependence kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    /// True register dependency; drives ordering and renaming.
    Register,
    /// Dependency through the flags register.
    Flag,
    /// Load depends on an earlier possibly-aliasing store; ordering with
    /// the producer's latency.
    Memory,
    /// Ordering-only dependency (anti/output memory hazards, pinned load
    /// order); no latency, no renaming.
    Address,
}

/// A typed edge `(producer, slot) → (consumer, slot)`.
pub struct Edge {
    /// The carried value, for `Register`/`Flag` edges.
    pub value: Option<Value>,
    /// Producing node.
    pub from: Node,
    /// Producing slot.
    pub from_slot: u8,
    /// Consuming node.
    pub to: Node,
    /// Consuming slot.
    pub to_slot: u8,
    /// Dependence kind.
    pub kind: EdgeKind,
    /// The consumer reads the previous iteration's value (loop mode).
    pub cross: bool,
}

/// The data-flow graph of one optimize window.
pub struct Dfg {
    /// All nodes, virtual source first and sink last.
    pub nodes: PrimaryMap<Node, NodeData>,
    /// All values.
    pub values: PrimaryMap<Value, ValueData>,
    /// All edges.
    pub edges: Vec<Edge>,
    /// The virtual source.
    pub source: Node,
    /// The virtual sink.
    pub sink: Node,
    /// Built for software pipelining (cross edges possible).
    pub loop_mode: bool,
    /// Resolved class of every symbolic name.
    pub classes: IndexMap<String, RegClass>,
}

impl Dfg {
    /// Real (instruction) nodes, in input order.
    pub fn real_nodes(&self) -> impl Iterator<Item = Node> + '_ {
        self.nodes
            .iter()
            .filter(|(_, data)| matches!(data.kind, NodeKind::Inst(_)))
            .map(|(node, _)| node)
    }

    /// Number of real nodes.
    pub fn num_real(&self) -> usize {
        self.real_nodes().count()
    }

    /// The instruction of a real node.
    pub fn inst(&self, node: Node) -> &Instruction {
        match &self.nodes[node].kind {
            NodeKind::Inst(inst) => inst,
            _ => panic!("{node} is virtual"),
        }
    }

    /// Is `node` a real instruction?
    pub fn is_real(&self, node: Node) -> bool {
        matches!(self.nodes[node].kind, NodeKind::Inst(_))
    }

    /// Edges consuming `value`.
    pub fn consumers_of(&self, value: Value) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(move |e| e.value == Some(value))
    }

    /// Values produced by `node`.
    pub fn produced_by(&self, node: Node) -> impl Iterator<Item = Value> + '_ {
        self.values
            .iter()
            .filter(move |(_, data)| data.producer == node)
            .map(|(value, _)| value)
    }

    /// The value consumed at `(node, slot)`, if that slot reads one.
    pub fn consumed_at(&self, node: Node, slot: u8) -> Option<Value> {
        self.edges
            .iter()
            .find(|e| e.to == node && e.to_slot == slot && e.value.is_some())
            .and_then(|e| e.value)
    }
}

/// Everything the builder needs besides the instructions.
pub struct BuildParams<'a> {
    /// Typing hints for symbolic names.
    pub hints: &'a IndexMap<String, RegClass>,
    /// Declared inputs; when non-empty, undeclared symbolic reads are fatal.
    pub inputs: &'a IndexMap<String, Option<Reg>>,
    /// Declared outputs.
    pub outputs: &'a [(String, Option<Reg>)],
    /// Memory alias policy.
    pub policy: MemPolicy,
    /// Order all load/load pairs.
    pub keep_load_order: bool,
    /// Build for software pipelining.
    pub loop_mode: bool,
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum NameKey {
    Arch(Reg),
    Sym(String),
}

impl NameKey {
    fn of(reg: &RegName) -> Self {
        match reg {
            RegName::Arch(r) => NameKey::Arch(*r),
            RegName::Symbolic(s) => NameKey::Sym(s.clone()),
        }
    }
}

struct MemRef {
    base: Option<Value>,
    offset: i64,
}

fn may_alias(policy: MemPolicy, a: &MemRef, b: &MemRef) -> bool {
    match policy {
        MemPolicy::Conservative => true,
        MemPolicy::BaseOffset => match (a.base, b.base) {
            (Some(x), Some(y)) if x == y => a.offset == b.offset,
            _ => true,
        },
    }
}

/// The register read by an operand, if any.
fn operand_reg(op: &Operand) -> Option<&RegName> {
    match op {
        Operand::Reg(r) => Some(r),
        Operand::Addr { base, .. } => Some(base),
        Operand::Imm(_) | Operand::Sym(_) => None,
    }
}

/// Unify the register class of every symbolic name across its uses.
fn resolve_classes(
    insts: &[Instruction],
    hints: &IndexMap<String, RegClass>,
) -> Result<IndexMap<String, RegClass>> {
    let mut classes: IndexMap<String, RegClass> = hints.clone();
    for inst in insts {
        for (od, op) in inst.desc.operands.iter().zip(&inst.operands) {
            let Some(class) = od.class else { continue };
            let Some(RegName::Symbolic(name)) = operand_reg(op) else {
                continue;
            };
            match classes.get(name) {
                None => {
                    classes.insert(name.clone(), class);
                }
                Some(&prev) if prev != class => {
                    return Err(Error::AmbiguousClass {
                        name: name.clone(),
                        first: prev,
                        second: class,
                    });
                }
                Some(_) => {}
            }
        }
    }
    Ok(classes)
}

struct Builder<'a> {
    arch: &'a dyn ArchModel,
    params: &'a BuildParams<'a>,
    dfg: Dfg,
    current: FxHashMap<NameKey, Value>,
    source_slots: u8,
    /// Loop mode: reads with no producer yet, resolved to backedge or
    /// source values once the whole body has been seen.
    pending: Vec<(NameKey, Node, u8, EdgeKind, usize)>,
    mem_nodes: Vec<(Node, MemAccess, MemRef)>,
}

impl<'a> Builder<'a> {
    fn source_value(&mut self, key: &NameKey, line: usize) -> Result<Value> {
        let (name, class, pin) = match key {
            NameKey::Arch(r) => (RegName::Arch(*r), r.class, Some(*r)),
            NameKey::Sym(s) => {
                let class = *self
                    .dfg
                    .classes
                    .get(s)
                    .expect("all symbolic names were class-resolved");
                let pin = if self.params.inputs.is_empty() {
                    None
                } else {
                    match self.params.inputs.get(s) {
                        Some(pin) => *pin,
                        None => {
                            return Err(Error::UndefinedRead {
                                line,
                                name: s.clone(),
                            });
                        }
                    }
                };
                if let Some(pin) = pin {
                    if pin.class != class {
                        return Err(Error::Config(format!(
                            "input `{s}` is pinned to a {} register but used as {class}",
                            pin.class
                        )));
                    }
                }
                (RegName::Symbolic(s.clone()), class, pin)
            }
        };
        let slot = self.source_slots;
        self.source_slots += 1;
        let value = self.dfg.values.push(ValueData {
            producer: self.dfg.source,
            slot,
            name,
            class,
            pin,
            output: false,
        });
        self.current.insert(key.clone(), value);
        Ok(value)
    }

    fn read_edge(&mut self, value: Value, node: Node, slot: u8, kind: EdgeKind, cross: bool) {
        let data = &self.dfg.values[value];
        self.dfg.edges.push(Edge {
            value: Some(value),
            from: data.producer,
            from_slot: data.slot,
            to: node,
            to_slot: slot,
            kind,
            cross,
        });
    }

    fn add_inst(&mut self, node: Node) -> Result<()> {
        let (reads, writes, mem_access, line) = {
            let inst = self.dfg.inst(node);
            let mut reads = Vec::new();
            let mut writes = Vec::new();
            for (slot, (od, op)) in inst.desc.operands.iter().zip(&inst.operands).enumerate() {
                let Some(reg) = operand_reg(op) else { continue };
                let key = NameKey::of(reg);
                let class = match reg {
                    RegName::Arch(r) => r.class,
                    RegName::Symbolic(s) => *self
                        .dfg
                        .classes
                        .get(s)
                        .expect("all symbolic names were class-resolved"),
                };
                let kind = if class == RegClass::Flags {
                    EdgeKind::Flag
                } else {
                    EdgeKind::Register
                };
                if od.role.is_read() {
                    let is_base = od.role == Role::AddrBase;
                    reads.push((key.clone(), slot as u8, kind, is_base));
                }
                let writeback = matches!(op, Operand::Addr { writeback: true, .. });
                if od.role.is_write() || writeback {
                    writes.push((key, slot as u8, reg.clone(), class, od.pin));
                }
            }
            let mem_offset = inst.operands.iter().find_map(|op| match op {
                Operand::Addr { offset, .. } => Some(*offset),
                _ => None,
            });
            (
                reads,
                writes,
                (inst.desc.memory, mem_offset.unwrap_or(0)),
                inst.line,
            )
        };

        // Reads first.
        let mut mem_base = None;
        for (key, slot, kind, is_base) in reads {
            let value = match self.current.get(&key).copied() {
                Some(v) => Some(v),
                None if self.params.loop_mode => {
                    self.pending.push((key.clone(), node, slot, kind, line));
                    None
                }
                None => Some(self.source_value(&key, line)?),
            };
            if let Some(value) = value {
                self.read_edge(value, node, slot, kind, false);
                if is_base {
                    mem_base = Some(value);
                }
            }
        }

        // Then writes.
        for (key, slot, name, class, desc_pin) in writes {
            let pin = match &name {
                RegName::Arch(r) => Some(*r),
                RegName::Symbolic(_) => desc_pin,
            };
            let value = self.dfg.values.push(ValueData {
                producer: node,
                slot,
                name,
                class,
                pin,
                output: false,
            });
            self.current.insert(key, value);
        }

        // Memory ordering.
        let (access, offset) = mem_access;
        if access != MemAccess::None {
            let this = MemRef {
                base: mem_base,
                offset,
            };
            for (prev_node, prev_access, prev_ref) in &self.mem_nodes {
                let kind = match (prev_access, access) {
                    (MemAccess::Store, MemAccess::Load) => {
                        may_alias(self.params.policy, prev_ref, &this).then_some(EdgeKind::Memory)
                    }
                    (MemAccess::Load, MemAccess::Store)
                    | (MemAccess::Store, MemAccess::Store) => {
                        may_alias(self.params.policy, prev_ref, &this).then_some(EdgeKind::Address)
                    }
                    (MemAccess::Load, MemAccess::Load) => {
                        self.params.keep_load_order.then_some(EdgeKind::Address)
                    }
                    _ => None,
                };
                if let Some(kind) = kind {
                    self.dfg.edges.push(Edge {
                        value: None,
                        from: *prev_node,
                        from_slot: 0,
                        to: node,
                        to_slot: 0,
                        kind,
                        cross: false,
                    });
                }
            }
            self.mem_nodes.push((node, access, this));
        }
        Ok(())
    }

    fn resolve_pending(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        for (key, node, slot, kind, line) in pending {
            match self.current.get(&key).copied() {
                // The name is rewritten later in the body: this read sees
                // the previous iteration's (final) value.
                Some(v) if self.dfg.values[v].producer != self.dfg.source => {
                    self.read_edge(v, node, slot, kind, true);
                }
                Some(v) => self.read_edge(v, node, slot, kind, false),
                None => {
                    let v = self.source_value(&key, line)?;
                    self.read_edge(v, node, slot, kind, false);
                }
            }
        }
        Ok(())
    }

    fn cross_memory_edges(&mut self) {
        for i in 0..self.mem_nodes.len() {
            for j in 0..=i {
                let (p_node, p_access, p_ref) = &self.mem_nodes[i];
                let (c_node, c_access, c_ref) = &self.mem_nodes[j];
                if p_node == c_node {
                    continue;
                }
                let kind = match (p_access, c_access) {
                    (MemAccess::Store, MemAccess::Load) => {
                        may_alias(self.params.policy, p_ref, c_ref).then_some(EdgeKind::Memory)
                    }
                    (MemAccess::Load, MemAccess::Store)
                    | (MemAccess::Store, MemAccess::Store) => {
                        may_alias(self.params.policy, p_ref, c_ref).then_some(EdgeKind::Address)
                    }
                    (MemAccess::Load, MemAccess::Load) => {
                        self.params.keep_load_order.then_some(EdgeKind::Address)
                    }
                    _ => None,
                };
                if let Some(kind) = kind {
                    self.dfg.edges.push(Edge {
                        value: None,
                        from: *p_node,
                        from_slot: 0,
                        to: *c_node,
                        to_slot: 0,
                        kind,
                        cross: true,
                    });
                }
            }
        }
    }

    fn connect_outputs(&mut self) -> Result<()> {
        for (oi, (name, pin)) in self.params.outputs.iter().enumerate() {
            let key = match self.arch.reg_info().parse_reg(name) {
                Some(r) => NameKey::Arch(r),
                None => NameKey::Sym(name.clone()),
            };
            let value = match self.current.get(&key) {
                Some(&v) => v,
                None => {
                    return Err(Error::Config(format!(
                        "declared output `{name}` is never written in the window"
                    )));
                }
            };
            let data = &mut self.dfg.values[value];
            data.output = true;
            if let Some(pin) = pin {
                if pin.class != data.class {
                    return Err(Error::Config(format!(
                        "output `{name}` is pinned to a {} register but has class {}",
                        pin.class, data.class
                    )));
                }
                match data.pin {
                    Some(existing) if existing != *pin => {
                        return Err(Error::Config(format!(
                            "output `{name}` is already pinned to {}",
                            self.arch.reg_info().display(existing)
                        )));
                    }
                    _ => data.pin = Some(*pin),
                }
            }
            let (from, from_slot) = (self.dfg.values[value].producer, self.dfg.values[value].slot);
            let sink = self.dfg.sink;
            self.dfg.edges.push(Edge {
                value: Some(value),
                from,
                from_slot,
                to: sink,
                to_slot: oi as u8,
                kind: EdgeKind::Register,
                cross: false,
            });
        }
        Ok(())
    }
}

/// Build the graph for one optimize window.
pub fn build(
    arch: &dyn ArchModel,
    insts: Vec<Instruction>,
    params: &BuildParams,
) -> Result<Dfg> {
    let classes = resolve_classes(&insts, params.hints)?;

    let mut nodes = PrimaryMap::new();
    let source = nodes.push(NodeData {
        kind: NodeKind::Source,
        src_index: usize::MAX,
    });

    let mut builder = Builder {
        arch,
        params,
        dfg: Dfg {
            nodes,
            values: PrimaryMap::new(),
            edges: Vec::new(),
            source,
            sink: source, // patched below
            loop_mode: params.loop_mode,
            classes,
        },
        current: FxHashMap::default(),
        source_slots: 0,
        pending: Vec::new(),
        mem_nodes: Vec::new(),
    };

    for (idx, inst) in insts.into_iter().enumerate() {
        let node = builder.dfg.nodes.push(NodeData {
            kind: NodeKind::Inst(inst),
            src_index: idx,
        });
        builder.add_inst(node)?;
    }

    builder.resolve_pending()?;
    if params.loop_mode {
        builder.cross_memory_edges();
    }

    builder.dfg.sink = builder.dfg.nodes.push(NodeData {
        kind: NodeKind::Sink,
        src_index: usize::MAX,
    });
    builder.connect_outputs()?;

    log::debug!(
        "dfg: {} nodes, {} values, {} edges",
        builder.dfg.num_real(),
        builder.dfg.values.len(),
        builder.dfg.edges.len()
    );
    Ok(builder.dfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::armv81m::Armv81m;

    fn classify_all(lines: &[&str]) -> Vec<Instruction> {
        lines
            .iter()
            .enumerate()
            .map(|(i, text)| {
                Instruction::classify(&Armv81m, text, i + 1).expect("test input classifies")
            })
            .collect()
    }

    fn empty_params<'a>(
        hints: &'a IndexMap<String, RegClass>,
        inputs: &'a IndexMap<String, Option<Reg>>,
    ) -> BuildParams<'a> {
        BuildParams {
            hints,
            inputs,
            outputs: &[],
            policy: MemPolicy::Conservative,
            keep_load_order: false,
            loop_mode: false,
        }
    }

    #[test]
    fn straight_line_chain() {
        let hints = IndexMap::new();
        let inputs = IndexMap::new();
        let insts = classify_all(&[
            "vldrw.u32 q0, [r0]",
            "vmla.s32 q0, q1, r2",
            "vstrw.u32 q0, [r1]",
        ]);
        let dfg = build(&Armv81m, insts, &empty_params(&hints, &inputs)).expect("builds");
        assert_eq!(dfg.num_real(), 3);
        // vmla reads the load's q0 (slot 0), vstrw reads vmla's q0.
        let nodes: Vec<Node> = dfg.real_nodes().collect();
        let vmla_acc = dfg.consumed_at(nodes[1], 0).expect("vmla reads q0");
        assert_eq!(dfg.values[vmla_acc].producer, nodes[0]);
        let stored = dfg.consumed_at(nodes[2], 0).expect("vstrw reads q0");
        assert_eq!(dfg.values[stored].producer, nodes[1]);
        // q1, r2, r0, r1 come from the source, pre-pinned.
        let q1 = dfg.consumed_at(nodes[1], 1).expect("vmla reads q1");
        assert_eq!(dfg.values[q1].producer, dfg.source);
        assert!(dfg.values[q1].pin.is_some());
    }

    #[test]
    fn every_read_has_one_producer() {
        let hints = IndexMap::new();
        let inputs = IndexMap::new();
        let insts = classify_all(&[
            "vldrw.u32 q0, [r0]",
            "vadd.i32 q1, q0, q0",
            "veor.i32 q2, q1, q0",
        ]);
        let dfg = build(&Armv81m, insts, &empty_params(&hints, &inputs)).expect("builds");
        for node in dfg.real_nodes() {
            let inst = dfg.inst(node);
            for (slot, od) in inst.desc.operands.iter().enumerate() {
                if od.role.is_read() && operand_reg(&inst.operands[slot]).is_some() {
                    let producers = dfg
                        .edges
                        .iter()
                        .filter(|e| e.to == node && e.to_slot == slot as u8 && e.value.is_some())
                        .count();
                    assert_eq!(producers, 1, "slot {slot} of {node}");
                }
            }
        }
    }

    #[test]
    fn undeclared_symbolic_read_is_fatal_with_declared_inputs() {
        let hints = IndexMap::new();
        let mut inputs = IndexMap::new();
        inputs.insert("inA".to_string(), None);
        let insts = classify_all(&["vmla.s32 q0, q1, other"]);
        let result = build(&Armv81m, insts, &empty_params(&hints, &inputs));
        assert!(matches!(result, Err(Error::UndefinedRead { name, .. }) if name == "other"));
    }

    #[test]
    fn symbolic_reads_auto_bind_without_declared_inputs() {
        let hints = IndexMap::new();
        let inputs = IndexMap::new();
        let insts = classify_all(&["vmla.s32 q0, q1, konst"]);
        let dfg = build(&Armv81m, insts, &empty_params(&hints, &inputs)).expect("builds");
        let node = dfg.real_nodes().next().expect("one node");
        let v = dfg.consumed_at(node, 2).expect("scalar read");
        assert_eq!(dfg.values[v].producer, dfg.source);
        assert_eq!(dfg.values[v].pin, None);
        assert_eq!(dfg.values[v].class, RegClass::Gpr);
    }

    #[test]
    fn ambiguous_symbolic_class_is_fatal() {
        let hints = IndexMap::new();
        let inputs = IndexMap::new();
        let insts = classify_all(&["vdup.u32 foo, r1", "eor foo, foo, foo"]);
        let result = build(&Armv81m, insts, &empty_params(&hints, &inputs));
        assert!(matches!(result, Err(Error::AmbiguousClass { name, .. }) if name == "foo"));
    }

    #[test]
    fn conservative_memory_edges() {
        let hints = IndexMap::new();
        let inputs = IndexMap::new();
        let insts = classify_all(&["vstrw.u32 q0, [r0]", "vldrw.u32 q1, [r1]"]);
        let dfg = build(&Armv81m, insts, &empty_params(&hints, &inputs)).expect("builds");
        assert!(dfg.edges.iter().any(|e| e.kind == EdgeKind::Memory));
    }

    #[test]
    fn base_offset_policy_disambiguates() {
        let hints = IndexMap::new();
        let inputs = IndexMap::new();
        let insts = classify_all(&["vstrw.u32 q0, [r0]", "vldrw.u32 q1, [r0, #16]"]);
        let mut params = empty_params(&hints, &inputs);
        params.policy = MemPolicy::BaseOffset;
        let dfg = build(&Armv81m, insts, &params).expect("builds");
        assert!(!dfg.edges.iter().any(|e| e.kind == EdgeKind::Memory));
    }

    #[test]
    fn keep_load_order_adds_address_edges() {
        let hints = IndexMap::new();
        let inputs = IndexMap::new();
        let insts = classify_all(&["vldrw.u32 q0, [r0]", "vldrw.u32 q1, [r1]"]);
        let mut params = empty_params(&hints, &inputs);
        params.keep_load_order = true;
        let dfg = build(&Armv81m, insts, &params).expect("builds");
        assert!(dfg.edges.iter().any(|e| e.kind == EdgeKind::Address));
    }

    #[test]
    fn flag_edges() {
        let hints = IndexMap::new();
        let inputs = IndexMap::new();
        let insts = classify_all(&["cmp r0, r1", "adc r2, r3, r4"]);
        let dfg = build(&Armv81m, insts, &empty_params(&hints, &inputs)).expect("builds");
        let nodes: Vec<Node> = dfg.real_nodes().collect();
        let flag_edge = dfg
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Flag)
            .expect("flag edge");
        assert_eq!(flag_edge.from, nodes[0]);
        assert_eq!(flag_edge.to, nodes[1]);
    }

    #[test]
    fn loop_carried_reads_become_cross_edges() {
        let hints = IndexMap::new();
        let inputs = IndexMap::new();
        let insts = classify_all(&["vmla.s32 q0, q1, r2", "vldrw.u32 q1, [r0], #16"]);
        let mut params = empty_params(&hints, &inputs);
        params.loop_mode = true;
        let dfg = build(&Armv81m, insts, &params).expect("builds");
        let nodes: Vec<Node> = dfg.real_nodes().collect();
        // vmla's q1 read is fed by the next line's load, across iterations.
        let cross: Vec<&Edge> = dfg.edges.iter().filter(|e| e.cross).collect();
        assert!(cross
            .iter()
            .any(|e| e.from == nodes[1] && e.to == nodes[0] && e.kind == EdgeKind::Register));
        // The accumulator q0 feeds itself across iterations.
        assert!(cross
            .iter()
            .any(|e| e.from == nodes[0] && e.to == nodes[0] && e.kind == EdgeKind::Register));
        // The post-incremented base feeds itself across iterations.
        assert!(cross
            .iter()
            .any(|e| e.from == nodes[1] && e.to == nodes[1] && e.kind == EdgeKind::Register));
    }

    #[test]
    fn outputs_are_pinned_and_sunk() {
        let hints = IndexMap::new();
        let inputs = IndexMap::new();
        let insts = classify_all(&["vldrw.u32 q0, [r0]", "vadd.i32 q1, q0, q0"]);
        let outputs = vec![("q1".to_string(), None)];
        let mut params = empty_params(&hints, &inputs);
        params.outputs = &outputs;
        let dfg = build(&Armv81m, insts, &params).expect("builds");
        let sunk = dfg.edges.iter().find(|e| e.to == dfg.sink).expect("sink edge");
        let value = sunk.value.expect("carries a value");
        assert!(dfg.values[value].output);
        assert_eq!(dfg.values[value].pin, Some(Reg::new(RegClass::Vec, 1)));
    }
}
