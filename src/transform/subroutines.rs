use super::Settings;
use crate::jvm::code::{
    ApiVersion, Insn, Label, LabelArena, LabelGenerator, LocalVariable, MethodNode, MethodVisitor,
    Opcode, TryCatchBlock,
};
use crate::jvm::Error;
use fixedbitset::FixedBitSet;
use std::collections::{HashMap, VecDeque};

/// Pipeline stage that replaces `jsr`/`ret` subroutines with inlined copies
///
/// The method body is buffered until `visit_end`. If it contains no `jsr`, it is replayed
/// unchanged. Otherwise every call site gets its own copy of the subroutine: `jsr` turns into
/// `aconst_null; goto <copy>` followed by a fresh return label, and `ret` into a `goto` to the
/// return label of the copy it belongs to. Exception handler ranges and local variable ranges
/// are copied along with the code they cover.
pub struct SubroutineInliner<V> {
    api: ApiVersion,
    labels: LabelArena,
    saw_code: bool,
    body: MethodNode,
    next: V,
}

impl<V: MethodVisitor> SubroutineInliner<V> {
    pub fn new(labels: LabelArena, settings: &Settings, next: V) -> SubroutineInliner<V> {
        SubroutineInliner {
            api: settings.api,
            labels,
            saw_code: false,
            body: MethodNode::with_api(settings.api),
            next,
        }
    }

    pub fn get_delegate(&mut self) -> &mut V {
        &mut self.next
    }

    pub fn into_delegate(self) -> V {
        self.next
    }
}

impl<V: MethodVisitor> MethodVisitor for SubroutineInliner<V> {
    fn api(&self) -> ApiVersion {
        self.api
    }

    /// Everything up to `visit_end` is buffered
    fn delegate(&mut self) -> Option<&mut dyn MethodVisitor> {
        Some(&mut self.body)
    }

    fn visit_code(&mut self) -> Result<(), Error> {
        self.saw_code = true;
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        if !self.saw_code {
            return self.next.visit_end();
        }
        let body = std::mem::replace(&mut self.body, MethodNode::with_api(self.api));
        let has_subroutines = body
            .instructions
            .iter()
            .any(|insn| matches!(insn, Insn::Jump(Opcode::Jsr, _)));

        if has_subroutines {
            let inlined = Inlining::new(&body, &self.labels)?.run()?;
            inlined.accept(&mut self.next)
        } else {
            body.accept(&mut self.next)
        }
    }
}

/// One copy of a routine (the main routine or a subroutine) in the output
struct Instantiation {
    /// Instantiation whose code calls this one (`None` for the main routine)
    parent: Option<usize>,

    /// Index of the routine being copied
    routine: usize,

    /// Label following the `jsr` that created this instantiation
    return_label: Option<Label>,

    /// Copy of every label for this instantiation
    ///
    /// Labels pointing at the same instruction in this copy share one clone.
    cloned_labels: HashMap<Label, Label>,
}

/// State of one inlining pass over a buffered method body
struct Inlining<'a> {
    body: &'a MethodNode,
    labels: &'a LabelArena,

    /// Instruction index of every label
    label_index: HashMap<Label, usize>,

    /// First label of every routine (the main routine has none)
    routine_starts: Vec<Option<Label>>,

    /// Routine index for each `jsr` target
    subroutine_ids: HashMap<Label, usize>,

    /// Instructions reachable in each routine (the main routine is first)
    routines: Vec<FixedBitSet>,

    /// Instructions reachable from more than one routine
    shared: FixedBitSet,

    instantiations: Vec<Instantiation>,
}

impl<'a> Inlining<'a> {
    fn new(body: &'a MethodNode, labels: &'a LabelArena) -> Result<Inlining<'a>, Error> {
        let insn_count = body.instructions.len();

        let mut label_index = HashMap::new();
        let mut routine_starts = vec![None];
        let mut subroutine_ids = HashMap::new();
        for (index, insn) in body.instructions.iter().enumerate() {
            match insn {
                Insn::Label(label) => {
                    label_index.entry(*label).or_insert(index);
                }
                Insn::Jump(Opcode::Jsr, target) => {
                    if !subroutine_ids.contains_key(target) {
                        subroutine_ids.insert(*target, routine_starts.len());
                        routine_starts.push(Some(*target));
                    }
                }
                _ => (),
            }
        }
        log::debug!("Inlining {} subroutine(s)", routine_starts.len() - 1);

        let mut inlining = Inlining {
            body,
            labels,
            label_index,
            routine_starts,
            subroutine_ids,
            routines: vec![],
            shared: FixedBitSet::with_capacity(insn_count),
            instantiations: vec![],
        };
        inlining.mark_routines()?;
        Ok(inlining)
    }

    fn resolve(&self, label: Label) -> Result<usize, Error> {
        match self.label_index.get(&label) {
            Some(index) => Ok(*index),
            None => {
                log::error!("Label {:?} is used but never placed", label);
                Err(Error::UnknownLabel(label))
            }
        }
    }

    /// Find the instructions belonging to every routine, and those that are shared
    fn mark_routines(&mut self) -> Result<(), Error> {
        let body = self.body;
        let insn_count = body.instructions.len();
        let mut visited = FixedBitSet::with_capacity(insn_count);

        for routine in 0..self.routine_starts.len() {
            let start = match self.routine_starts[routine] {
                None => 0,
                Some(label) => self.resolve(label)?,
            };
            let mut owned = FixedBitSet::with_capacity(insn_count);
            self.mark_block(start, &mut owned, &mut visited)?;

            // Handlers become part of the routine once it reaches into their protected range,
            // and the handler code can in turn reach into more protected ranges
            let mut found_handler = true;
            while found_handler {
                found_handler = false;
                for block in &body.try_catch_blocks {
                    let handler = self.resolve(block.handler)?;
                    if owned.contains(handler) {
                        continue;
                    }
                    let start = self.resolve(block.start)?;
                    let end = self.resolve(block.end)?;
                    if start < end && owned.count_ones(start..end) > 0 {
                        self.mark_block(handler, &mut owned, &mut visited)?;
                        found_handler = true;
                    }
                }
            }

            log::trace!(
                "Routine {} owns {} instruction(s)",
                routine,
                owned.count_ones(..)
            );
            self.routines.push(owned);
        }
        Ok(())
    }

    /// Mark everything reachable from an instruction, without following `jsr` or exceptions
    fn mark_block(
        &mut self,
        start: usize,
        owned: &mut FixedBitSet,
        visited: &mut FixedBitSet,
    ) -> Result<(), Error> {
        let body = self.body;
        let insns = &body.instructions;
        let mut to_process = vec![start];
        while let Some(index) = to_process.pop() {
            if index >= insns.len() || owned.put(index) {
                continue;
            }
            if visited.put(index) {
                self.shared.insert(index);
            }

            let insn = &insns[index];
            match insn {
                Insn::Jump(Opcode::Jsr, _) => (),
                Insn::Jump(_, target) => to_process.push(self.resolve(*target)?),
                Insn::TableSwitch {
                    default, targets, ..
                }
                | Insn::LookupSwitch {
                    default, targets, ..
                } => {
                    to_process.push(self.resolve(*default)?);
                    for target in targets {
                        to_process.push(self.resolve(*target)?);
                    }
                }
                _ => (),
            }

            let falls_through = insn
                .opcode()
                .map_or(true, |opcode| !opcode.is_unconditional_exit());
            if falls_through {
                to_process.push(index + 1);
            }
        }
        Ok(())
    }

    /// Instantiation that emits an instruction, as seen from some instantiation
    ///
    /// Shared instructions are emitted by the oldest ancestor that owns them.
    fn find_owner(&self, instantiation: usize, index: usize) -> Option<usize> {
        let current = &self.instantiations[instantiation];
        if !self.routines[current.routine].contains(index) {
            return None;
        }
        if !self.shared.contains(index) {
            return Some(instantiation);
        }
        let mut owner = instantiation;
        let mut ancestor = current.parent;
        while let Some(id) = ancestor {
            if self.routines[self.instantiations[id].routine].contains(index) {
                owner = id;
            }
            ancestor = self.instantiations[id].parent;
        }
        Some(owner)
    }

    fn instantiate(&mut self, parent: Option<usize>, routine: usize) -> Result<usize, Error> {
        if let Some(start) = self.routine_starts[routine] {
            let mut ancestor = parent;
            while let Some(id) = ancestor {
                if self.instantiations[id].routine == routine {
                    log::error!("Subroutine at {:?} calls itself", start);
                    return Err(Error::RecursiveSubroutine(start));
                }
                ancestor = self.instantiations[id].parent;
            }
        }

        let id = self.instantiations.len();
        self.instantiations.push(Instantiation {
            parent,
            routine,
            return_label: parent.map(|_| self.labels.fresh_label()),
            cloned_labels: HashMap::new(),
        });

        // Consecutive labels collapse into one, unless this copy emits an instruction between
        let mut cloned_labels = HashMap::new();
        let mut current: Option<Label> = None;
        for (index, insn) in self.body.instructions.iter().enumerate() {
            if let Insn::Label(label) = insn {
                let labels = self.labels;
                let cloned = *current.get_or_insert_with(|| labels.fresh_label());
                cloned_labels.insert(*label, cloned);
            } else if self.find_owner(id, index) == Some(id) {
                current = None;
            }
        }
        self.instantiations[id].cloned_labels = cloned_labels;
        Ok(id)
    }

    fn cloned_label(&self, instantiation: usize, label: Label) -> Result<Label, Error> {
        match self.instantiations[instantiation].cloned_labels.get(&label) {
            Some(cloned) => Ok(*cloned),
            None => {
                log::error!("Label {:?} is used but never placed", label);
                Err(Error::UnknownLabel(label))
            }
        }
    }

    /// Clone of a label that is jumped to, which lives in the instantiation emitting its code
    fn cloned_target(&self, instantiation: usize, label: Label) -> Result<Label, Error> {
        let index = self.resolve(label)?;
        let owner = self.find_owner(instantiation, index).unwrap_or(instantiation);
        self.cloned_label(owner, label)
    }

    fn run(mut self) -> Result<MethodNode, Error> {
        let mut output = MethodNode::with_api(self.body.api());
        output.max_stack = self.body.max_stack;
        output.max_locals = self.body.max_locals;

        let mut worklist = VecDeque::new();
        worklist.push_back(self.instantiate(None, 0)?);
        while let Some(instantiation) = worklist.pop_front() {
            self.emit(instantiation, &mut worklist, &mut output)?;
        }
        Ok(output)
    }

    fn emit(
        &mut self,
        instantiation: usize,
        worklist: &mut VecDeque<usize>,
        output: &mut MethodNode,
    ) -> Result<(), Error> {
        let body = self.body;
        let mut previous_label: Option<Label> = None;

        for (index, insn) in body.instructions.iter().enumerate() {
            if let Insn::Label(label) = insn {
                let cloned = self.cloned_label(instantiation, *label)?;
                if previous_label != Some(cloned) {
                    output.instructions.push(Insn::Label(cloned));
                    previous_label = Some(cloned);
                }
                continue;
            }
            if self.find_owner(instantiation, index) != Some(instantiation) {
                continue;
            }

            match insn {
                Insn::Var(Opcode::Ret, _) => {
                    // Code may fall from a nested subroutine into the `ret` of an enclosing one,
                    // so return from the oldest instantiation owning the `ret`
                    let mut return_label = None;
                    let mut owner = Some(instantiation);
                    while let Some(id) = owner {
                        let current = &self.instantiations[id];
                        if self.routines[current.routine].contains(index) {
                            return_label = current.return_label;
                        }
                        owner = current.parent;
                    }
                    match return_label {
                        Some(label) => output.instructions.push(Insn::Jump(Opcode::Goto, label)),
                        None => {
                            log::error!("ret at {} is not in a subroutine", index);
                            return Err(Error::RetNotOwned(index));
                        }
                    }
                }
                Insn::Jump(Opcode::Jsr, target) => {
                    let routine = match self.subroutine_ids.get(target) {
                        Some(routine) => *routine,
                        None => return Err(Error::UnknownLabel(*target)),
                    };
                    let child = self.instantiate(Some(instantiation), routine)?;
                    let cloned_target = self.cloned_target(child, *target)?;
                    let return_label = self.instantiations[child].return_label;

                    output.instructions.push(Insn::Insn(Opcode::AConstNull));
                    output
                        .instructions
                        .push(Insn::Jump(Opcode::Goto, cloned_target));
                    if let Some(return_label) = return_label {
                        output.instructions.push(Insn::Label(return_label));
                    }
                    worklist.push_back(child);
                }
                other => {
                    let cloned = self.clone_insn(instantiation, other)?;
                    output.instructions.push(cloned);
                }
            }
        }

        for block in &body.try_catch_blocks {
            let start = self.cloned_label(instantiation, block.start)?;
            let end = self.cloned_label(instantiation, block.end)?;
            if start != end {
                output.try_catch_blocks.push(TryCatchBlock {
                    start,
                    end,
                    handler: self.cloned_target(instantiation, block.handler)?,
                    catch_type: block.catch_type.clone(),
                });
            }
        }

        for local in &body.local_variables {
            let start = self.cloned_label(instantiation, local.start)?;
            let end = self.cloned_label(instantiation, local.end)?;
            if start != end {
                output.local_variables.push(LocalVariable {
                    start,
                    end,
                    ..local.clone()
                });
            }
        }
        Ok(())
    }

    /// Copy of an instruction for an instantiation, with its labels swapped for clones
    fn clone_insn(&self, instantiation: usize, insn: &Insn) -> Result<Insn, Error> {
        let target = |label: Label| self.cloned_target(instantiation, label);
        Ok(match insn {
            Insn::Jump(opcode, label) => Insn::Jump(*opcode, target(*label)?),
            Insn::LineNumber(line, start) => Insn::LineNumber(*line, target(*start)?),
            Insn::TableSwitch {
                low,
                high,
                default,
                targets,
            } => Insn::TableSwitch {
                low: *low,
                high: *high,
                default: target(*default)?,
                targets: targets
                    .iter()
                    .map(|label| target(*label))
                    .collect::<Result<_, _>>()?,
            },
            Insn::LookupSwitch {
                default,
                keys,
                targets,
            } => Insn::LookupSwitch {
                default: target(*default)?,
                keys: keys.clone(),
                targets: targets
                    .iter()
                    .map(|label| target(*label))
                    .collect::<Result<_, _>>()?,
            },

            // Labels of `new` instructions that are not in the body stay as they are
            Insn::Frame(frame) => Insn::Frame(
                frame.map_labels(|label| target(label).unwrap_or(label)),
            ),
            other => other.clone(),
        })
    }
}
