use super::*;
use crate::jvm::code::{
    ApiVersion, InsnKind, Label, LabelArena, LabelGenerator, MethodVisitor, Opcode,
};
use crate::jvm::{
    BaseType, BinaryName, Constant, Error, FieldType, Handle, MethodDescriptor, MethodHeader,
    RefType, UnqualifiedName,
};
use crate::transform::Settings;
use crate::util::Width;
use std::collections::HashMap;

/// Pipeline stage that simulates every instruction against an abstract frame
///
/// Events are forwarded to the next stage first, then used to update the frame. This means that
/// while the next stage handles an instruction event, [`FrameAnalyzer::frame`] still shows the
/// frame just before that instruction. Once the event returns, `frame` is the state after the
/// instruction and [`FrameAnalyzer::frame_before`] the state before it.
///
/// The frame becomes unreachable (`None`) after an unconditional jump, a switch, a return, or
/// `athrow`, and stays so until the next (expanded) stack map frame.
///
/// `jsr` and `ret` are not supported: run a [`crate::transform::SubroutineInliner`] first.
pub struct FrameAnalyzer<V> {
    /// Class declaring the method
    owner: BinaryName,

    api: ApiVersion,
    check_stack_deltas: bool,

    /// Source of labels for `new` instructions that are not preceded by one
    labels: LabelArena,

    /// Current frame, `None` if the current instruction is unreachable
    frame: Option<Frame>,

    /// Frame before the last instruction
    frame_before: Option<Frame>,

    /// Labels visited since the last instruction
    pending_labels: Vec<Label>,

    /// Type created by the `new` just after each label
    uninitialized_types: HashMap<Label, RefType<BinaryName>>,

    max_stack: usize,
    max_locals: usize,

    next: V,
}

impl<V: MethodVisitor> FrameAnalyzer<V> {
    pub fn new(
        header: &MethodHeader,
        labels: LabelArena,
        settings: &Settings,
        next: V,
    ) -> FrameAnalyzer<V> {
        let locals = header.initial_locals();
        let max_locals = locals.len();
        FrameAnalyzer {
            owner: header.owner.clone(),
            api: settings.api,
            check_stack_deltas: settings.check_stack_deltas,
            labels,
            frame: Some(Frame {
                locals,
                stack: vec![],
            }),
            frame_before: None,
            pending_labels: vec![],
            uninitialized_types: HashMap::new(),
            max_stack: 0,
            max_locals,
            next,
        }
    }

    /// Current frame, or `None` if the code at this point is unreachable
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    /// Frame just before the last instruction visited
    pub fn frame_before(&self) -> Option<&Frame> {
        self.frame_before.as_ref()
    }

    /// Type that an uninitialized value will have once `<init>` is called on it
    pub fn uninitialized_type(&self, label: Label) -> Option<&RefType<BinaryName>> {
        self.uninitialized_types.get(&label)
    }

    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    pub fn max_locals(&self) -> usize {
        self.max_locals
    }

    pub fn get_delegate(&mut self) -> &mut V {
        &mut self.next
    }

    pub fn into_delegate(self) -> V {
        self.next
    }

    /// Run a simulation step on the current frame
    ///
    /// Takes care of the bookkeeping common to all instructions: the pre-instruction snapshot,
    /// clearing the pending labels, checking the static stack delta, and updating maximums.
    fn execute(
        &mut self,
        opcode: Opcode,
        step: impl FnOnce(&mut Frame) -> Result<(), Error>,
    ) -> Result<(), Error> {
        self.frame_before = self.frame.clone();
        let result = match self.frame.as_mut() {
            None => Ok(()),
            Some(frame) => {
                let height_before = frame.stack.len() as i32;
                step(frame)?;

                if self.check_stack_deltas {
                    if let Some(expected) = opcode.stack_delta() {
                        let actual = frame.stack.len() as i32 - height_before;
                        if actual != expected {
                            log::error!(
                                "Simulating {:?} changed the stack by {} instead of {}",
                                opcode,
                                actual,
                                expected
                            );
                            return Err(Error::FrameSizeMismatch {
                                opcode,
                                expected,
                                actual,
                            });
                        }
                    }
                }

                self.max_stack = self.max_stack.max(frame.stack.len());
                self.max_locals = self.max_locals.max(frame.locals.len());
                log::trace!("{:?} -> {:?}", opcode, frame);
                Ok(())
            }
        };
        self.pending_labels.clear();
        if opcode.is_unconditional_exit() {
            self.frame = None;
        }
        result
    }

    fn check_kind(opcode: Opcode, event: InsnKind) -> Result<(), Error> {
        if opcode.kind() != event {
            log::error!("Opcode {:?} visited as a {:?} instruction", opcode, event);
            return Err(Error::InvalidEventOpcode { opcode, event });
        }
        if matches!(opcode, Opcode::Jsr | Opcode::Ret) {
            log::error!("Subroutines must be inlined before simulating frames");
            return Err(Error::InvalidInstruction(
                opcode,
                "subroutines are not supported, inline them first",
            ));
        }
        Ok(())
    }
}

impl<V: MethodVisitor> MethodVisitor for FrameAnalyzer<V> {
    fn api(&self) -> ApiVersion {
        self.api
    }

    fn delegate(&mut self) -> Option<&mut dyn MethodVisitor> {
        Some(&mut self.next)
    }

    fn visit_frame(&mut self, frame: &StackMapFrame) -> Result<(), Error> {
        let (locals, stack) = match frame {
            StackMapFrame::Expanded { locals, stack } => (locals, stack),
            _ => {
                log::error!("Frame analysis requires expanded frames, got {:?}", frame);
                return Err(Error::CompressedFrame);
            }
        };
        self.next.visit_frame(frame)?;

        let frame = Frame::from_compact(locals, stack);
        self.max_stack = self.max_stack.max(frame.stack.len());
        self.max_locals = self.max_locals.max(frame.locals.len());
        self.frame = Some(frame);
        Ok(())
    }

    fn visit_insn(&mut self, opcode: Opcode) -> Result<(), Error> {
        Self::check_kind(opcode, InsnKind::Insn)?;
        self.next.visit_insn(opcode)?;
        self.execute(opcode, |frame| execute_insn(frame, opcode))
    }

    fn visit_int_insn(&mut self, opcode: Opcode, operand: i32) -> Result<(), Error> {
        Self::check_kind(opcode, InsnKind::Int)?;
        self.next.visit_int_insn(opcode, operand)?;
        self.execute(opcode, |frame| {
            let stack = &mut frame.stack;
            match opcode {
                Opcode::NewArray => {
                    let element_type = BaseType::from_array_type_code(operand)?;
                    pop(stack, opcode)?;
                    stack.push(FrameValue::Object(RefType::array(FieldType::Base(
                        element_type,
                    ))));
                }
                _ => stack.push(FrameValue::Integer),
            }
            Ok(())
        })
    }

    fn visit_var_insn(&mut self, opcode: Opcode, var: u16) -> Result<(), Error> {
        Self::check_kind(opcode, InsnKind::Var)?;
        self.next.visit_var_insn(opcode, var)?;

        let var = var as usize;
        let width = match opcode {
            Opcode::LLoad | Opcode::DLoad | Opcode::LStore | Opcode::DStore => 2,
            _ => 1,
        };
        self.max_locals = self.max_locals.max(var + width);
        self.execute(opcode, |frame| {
            let Frame { locals, stack } = frame;
            match opcode {
                Opcode::ILoad => stack.push(FrameValue::Integer),
                Opcode::FLoad => stack.push(FrameValue::Float),
                Opcode::LLoad => push_wide(stack, FrameValue::Long),
                Opcode::DLoad => push_wide(stack, FrameValue::Double),
                Opcode::ALoad => stack.push(get_local(locals, var)),
                Opcode::IStore | Opcode::FStore | Opcode::AStore => {
                    let value = pop(stack, opcode)?;
                    set_local(locals, var, value);
                    invalidate_wide_before(locals, var);
                }
                _ => {
                    pop(stack, opcode)?;
                    let value = pop(stack, opcode)?;
                    set_local(locals, var, value);
                    set_local(locals, var + 1, FrameValue::Top);
                    invalidate_wide_before(locals, var);
                }
            }
            Ok(())
        })
    }

    fn visit_type_insn(&mut self, opcode: Opcode, typ: &RefType<BinaryName>) -> Result<(), Error> {
        Self::check_kind(opcode, InsnKind::Type)?;
        if opcode == Opcode::New {
            if self.pending_labels.is_empty() {
                let label = self.labels.fresh_label();
                log::trace!("Placing {:?} before `new {:?}`", label, typ);
                self.next.visit_label(label)?;
                self.pending_labels.push(label);
            }
            for label in &self.pending_labels {
                self.uninitialized_types.insert(*label, typ.clone());
            }
        }
        self.next.visit_type_insn(opcode, typ)?;

        let new_label = self.pending_labels.first().copied();
        self.execute(opcode, |frame| {
            let stack = &mut frame.stack;
            match opcode {
                Opcode::New => {
                    if let Some(label) = new_label {
                        stack.push(FrameValue::Uninitialized(label));
                    }
                }
                Opcode::ANewArray => {
                    pop(stack, opcode)?;
                    stack.push(FrameValue::Object(RefType::array(FieldType::Ref(
                        typ.clone(),
                    ))));
                }
                Opcode::CheckCast => {
                    pop(stack, opcode)?;
                    stack.push(FrameValue::Object(typ.clone()));
                }
                _ => {
                    pop(stack, opcode)?;
                    stack.push(FrameValue::Integer);
                }
            }
            Ok(())
        })
    }

    fn visit_field_insn(
        &mut self,
        opcode: Opcode,
        owner: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &FieldType<BinaryName>,
    ) -> Result<(), Error> {
        Self::check_kind(opcode, InsnKind::Field)?;
        self.next.visit_field_insn(opcode, owner, name, descriptor)?;
        self.execute(opcode, |frame| {
            let stack = &mut frame.stack;
            match opcode {
                Opcode::GetStatic => push_field_type(stack, descriptor),
                Opcode::PutStatic => pop_n(stack, descriptor.width(), opcode)?,
                Opcode::GetField => {
                    pop(stack, opcode)?;
                    push_field_type(stack, descriptor);
                }
                _ => pop_n(stack, descriptor.width() + 1, opcode)?,
            }
            Ok(())
        })
    }

    fn visit_method_insn(
        &mut self,
        opcode: Opcode,
        owner: &RefType<BinaryName>,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
        is_interface: bool,
    ) -> Result<(), Error> {
        Self::check_kind(opcode, InsnKind::Method)?;
        self.next
            .visit_method_insn(opcode, owner, name, descriptor, is_interface)?;

        let this_class = &self.owner;
        let uninitialized_types = &self.uninitialized_types;
        let frame_before = self.frame.clone();
        let result = match self.frame.as_mut() {
            None => Ok(()),
            Some(frame) => {
                let Frame { locals, stack } = frame;
                pop_n(stack, descriptor.parameter_length(false), opcode)?;
                if opcode != Opcode::InvokeStatic {
                    let receiver = pop(stack, opcode)?;
                    if opcode == Opcode::InvokeSpecial && name.is_constructor() {
                        let initialized = match &receiver {
                            FrameValue::UninitializedThis => {
                                Some(FrameValue::object(this_class.clone()))
                            }
                            FrameValue::Uninitialized(label) => {
                                match uninitialized_types.get(label) {
                                    Some(typ) => Some(FrameValue::Object(typ.clone())),
                                    None => {
                                        log::error!("No `new` recorded for {:?}", label);
                                        return Err(Error::UnknownUninitialized(*label));
                                    }
                                }
                            }
                            _ => None,
                        };
                        if let Some(initialized) = initialized {
                            replace_all(locals, &receiver, &initialized);
                            replace_all(stack, &receiver, &initialized);
                        }
                    }
                }
                if let Some(return_type) = &descriptor.return_type {
                    push_field_type(stack, return_type);
                }
                self.max_stack = self.max_stack.max(stack.len());
                log::trace!("{:?} {:?} -> {:?}", opcode, name, frame);
                Ok(())
            }
        };
        self.frame_before = frame_before;
        self.pending_labels.clear();
        result
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
        bootstrap_method: &Handle,
        bootstrap_arguments: &[Constant],
    ) -> Result<(), Error> {
        self.api.check_invoke_dynamic()?;
        self.next
            .visit_invoke_dynamic_insn(name, descriptor, bootstrap_method, bootstrap_arguments)?;
        self.execute(Opcode::InvokeDynamic, |frame| {
            let stack = &mut frame.stack;
            pop_n(stack, descriptor.parameter_length(false), Opcode::InvokeDynamic)?;
            if let Some(return_type) = &descriptor.return_type {
                push_field_type(stack, return_type);
            }
            Ok(())
        })
    }

    fn visit_jump_insn(&mut self, opcode: Opcode, label: Label) -> Result<(), Error> {
        Self::check_kind(opcode, InsnKind::Jump)?;
        self.next.visit_jump_insn(opcode, label)?;
        self.execute(opcode, |frame| {
            let stack = &mut frame.stack;
            match opcode {
                Opcode::Goto => (),
                Opcode::IfICmpEq
                | Opcode::IfICmpNe
                | Opcode::IfICmpLt
                | Opcode::IfICmpGe
                | Opcode::IfICmpGt
                | Opcode::IfICmpLe
                | Opcode::IfACmpEq
                | Opcode::IfACmpNe => pop_n(stack, 2, opcode)?,
                _ => pop_n(stack, 1, opcode)?,
            }
            Ok(())
        })
    }

    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        self.next.visit_label(label)?;
        self.pending_labels.push(label);
        Ok(())
    }

    fn visit_ldc_insn(&mut self, constant: &Constant) -> Result<(), Error> {
        self.api.check_ldc(constant)?;
        self.next.visit_ldc_insn(constant)?;
        self.execute(Opcode::Ldc, |frame| {
            let stack = &mut frame.stack;
            match constant {
                Constant::Integer(_) => stack.push(FrameValue::Integer),
                Constant::Float(_) => stack.push(FrameValue::Float),
                Constant::Long(_) => push_wide(stack, FrameValue::Long),
                Constant::Double(_) => push_wide(stack, FrameValue::Double),
                Constant::String(_) => stack.push(FrameValue::object(BinaryName::STRING)),
                Constant::Class(_) => stack.push(FrameValue::object(BinaryName::CLASS)),
                Constant::MethodType(_) => {
                    stack.push(FrameValue::object(BinaryName::METHODTYPE))
                }
                Constant::MethodHandle(_) => {
                    stack.push(FrameValue::object(BinaryName::METHODHANDLE))
                }
                Constant::Dynamic(dynamic) => push_field_type(stack, &dynamic.descriptor),
            }
            Ok(())
        })
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<(), Error> {
        self.next.visit_iinc_insn(var, increment)?;
        let var = var as usize;
        self.max_locals = self.max_locals.max(var + 1);
        self.execute(Opcode::IInc, |frame| {
            set_local(&mut frame.locals, var, FrameValue::Integer);
            Ok(())
        })
    }

    fn visit_table_switch_insn(
        &mut self,
        low: i32,
        high: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), Error> {
        self.next
            .visit_table_switch_insn(low, high, default, targets)?;
        self.execute(Opcode::TableSwitch, |frame| {
            pop(&mut frame.stack, Opcode::TableSwitch).map(|_| ())
        })
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        keys: &[i32],
        targets: &[Label],
    ) -> Result<(), Error> {
        self.next.visit_lookup_switch_insn(default, keys, targets)?;
        self.execute(Opcode::LookupSwitch, |frame| {
            pop(&mut frame.stack, Opcode::LookupSwitch).map(|_| ())
        })
    }

    fn visit_multi_a_new_array_insn(
        &mut self,
        typ: &RefType<BinaryName>,
        dimensions: u8,
    ) -> Result<(), Error> {
        self.next.visit_multi_a_new_array_insn(typ, dimensions)?;
        self.execute(Opcode::MultiANewArray, |frame| {
            let stack = &mut frame.stack;
            pop_n(stack, dimensions as usize, Opcode::MultiANewArray)?;
            stack.push(FrameValue::Object(typ.clone()));
            Ok(())
        })
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        self.max_stack = self.max_stack.max(max_stack as usize);
        self.max_locals = self.max_locals.max(max_locals as usize);
        log::debug!(
            "Frame analysis maximums: stack {}, locals {}",
            self.max_stack,
            self.max_locals
        );
        self.next
            .visit_maxs(self.max_stack as u16, self.max_locals as u16)
    }
}

/// Update the frame to reflect the effects of an instruction with no operand
fn execute_insn(frame: &mut Frame, opcode: Opcode) -> Result<(), Error> {
    use FrameValue::*;
    use Opcode::*;

    let stack = &mut frame.stack;

    match opcode {
        Nop | INeg | LNeg | FNeg | DNeg | I2B | I2C | I2S | Return => (),
        AConstNull => stack.push(Null),
        IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 => {
            stack.push(Integer)
        }
        LConst0 | LConst1 => push_wide(stack, Long),
        FConst0 | FConst1 | FConst2 => stack.push(Float),
        DConst0 | DConst1 => push_wide(stack, Double),

        IALoad | BALoad | CALoad | SALoad => {
            pop_n(stack, 2, opcode)?;
            stack.push(Integer);
        }
        LALoad | D2L => {
            pop_n(stack, 2, opcode)?;
            push_wide(stack, Long);
        }
        FALoad => {
            pop_n(stack, 2, opcode)?;
            stack.push(Float);
        }
        DALoad | L2D => {
            pop_n(stack, 2, opcode)?;
            push_wide(stack, Double);
        }
        AALoad => {
            pop(stack, opcode)?;
            let array_type = pop(stack, opcode)?;
            let element = match array_type {
                Object(ref_type) => match ref_type.element_type() {
                    Some(element_type) => FrameValue::from(element_type),
                    None => FrameValue::object(BinaryName::OBJECT),
                },
                Null => Null,
                _ => FrameValue::object(BinaryName::OBJECT),
            };
            stack.push(element);
        }

        IAStore | BAStore | CAStore | SAStore | FAStore | AAStore => pop_n(stack, 3, opcode)?,
        LAStore | DAStore => pop_n(stack, 4, opcode)?,

        Pop | IReturn | FReturn | AReturn | AThrow | MonitorEnter | MonitorExit => {
            pop(stack, opcode)?;
        }
        Pop2 | LReturn | DReturn => pop_n(stack, 2, opcode)?,

        Dup => {
            let arg1 = pop(stack, opcode)?;
            stack.push(arg1.clone());
            stack.push(arg1);
        }
        DupX1 => {
            let arg1 = pop(stack, opcode)?;
            let arg2 = pop(stack, opcode)?;
            stack.push(arg1.clone());
            stack.push(arg2);
            stack.push(arg1);
        }
        DupX2 => {
            let arg1 = pop(stack, opcode)?;
            let arg2 = pop(stack, opcode)?;
            let arg3 = pop(stack, opcode)?;
            stack.push(arg1.clone());
            stack.push(arg3);
            stack.push(arg2);
            stack.push(arg1);
        }
        Dup2 => {
            let arg1 = pop(stack, opcode)?;
            let arg2 = pop(stack, opcode)?;
            stack.push(arg2.clone());
            stack.push(arg1.clone());
            stack.push(arg2);
            stack.push(arg1);
        }
        Dup2X1 => {
            let arg1 = pop(stack, opcode)?;
            let arg2 = pop(stack, opcode)?;
            let arg3 = pop(stack, opcode)?;
            stack.push(arg2.clone());
            stack.push(arg1.clone());
            stack.push(arg3);
            stack.push(arg2);
            stack.push(arg1);
        }
        Dup2X2 => {
            let arg1 = pop(stack, opcode)?;
            let arg2 = pop(stack, opcode)?;
            let arg3 = pop(stack, opcode)?;
            let arg4 = pop(stack, opcode)?;
            stack.push(arg2.clone());
            stack.push(arg1.clone());
            stack.push(arg4);
            stack.push(arg3);
            stack.push(arg2);
            stack.push(arg1);
        }
        Swap => {
            let arg1 = pop(stack, opcode)?;
            let arg2 = pop(stack, opcode)?;
            stack.push(arg1);
            stack.push(arg2);
        }

        IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor | IShl | IShr | IUShr | L2I
        | D2I | FCmpL | FCmpG => {
            pop_n(stack, 2, opcode)?;
            stack.push(Integer);
        }
        LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor => {
            pop_n(stack, 4, opcode)?;
            push_wide(stack, Long);
        }
        FAdd | FSub | FMul | FDiv | FRem | L2F | D2F => {
            pop_n(stack, 2, opcode)?;
            stack.push(Float);
        }
        DAdd | DSub | DMul | DDiv | DRem => {
            pop_n(stack, 4, opcode)?;
            push_wide(stack, Double);
        }
        LShl | LShr | LUShr => {
            pop_n(stack, 3, opcode)?;
            push_wide(stack, Long);
        }

        I2L | F2L => {
            pop(stack, opcode)?;
            push_wide(stack, Long);
        }
        I2F => {
            pop(stack, opcode)?;
            stack.push(Float);
        }
        I2D | F2D => {
            pop(stack, opcode)?;
            push_wide(stack, Double);
        }
        F2I | ArrayLength => {
            pop(stack, opcode)?;
            stack.push(Integer);
        }
        LCmp | DCmpL | DCmpG => {
            pop_n(stack, 4, opcode)?;
            stack.push(Integer);
        }

        _ => {
            log::error!("{:?} is not an operand-less instruction", opcode);
            return Err(Error::InvalidEventOpcode {
                opcode,
                event: InsnKind::Insn,
            });
        }
    }

    Ok(())
}

fn replace_all(values: &mut [FrameValue], original: &FrameValue, updated: &FrameValue) {
    for value in values.iter_mut() {
        if value == original {
            *value = updated.clone();
        }
    }
}

/// Read a local, treating locals past the end as unusable
fn get_local(locals: &[FrameValue], var: usize) -> FrameValue {
    locals.get(var).cloned().unwrap_or(FrameValue::Top)
}

/// Write a local, growing the locals with `Top` if needed
fn set_local(locals: &mut Vec<FrameValue>, var: usize, value: FrameValue) {
    if var >= locals.len() {
        locals.resize(var + 1, FrameValue::Top);
    }
    locals[var] = value;
}

/// Storing into the second half of a `long` or `double` destroys the whole value
fn invalidate_wide_before(locals: &mut Vec<FrameValue>, var: usize) {
    if var > 0 && get_local(locals, var - 1).width() == 2 {
        set_local(locals, var - 1, FrameValue::Top);
    }
}

fn push_wide(stack: &mut Vec<FrameValue>, value: FrameValue) {
    stack.push(value);
    stack.push(FrameValue::Top);
}

fn push_field_type(stack: &mut Vec<FrameValue>, field_type: &FieldType<BinaryName>) {
    let value = FrameValue::from(field_type.clone());
    if value.width() == 2 {
        push_wide(stack, value);
    } else {
        stack.push(value);
    }
}

fn pop(stack: &mut Vec<FrameValue>, opcode: Opcode) -> Result<FrameValue, Error> {
    stack.pop().ok_or_else(|| {
        log::error!("Operand stack underflow at {:?}", opcode);
        Error::StackUnderflow(opcode)
    })
}

fn pop_n(stack: &mut Vec<FrameValue>, slots: usize, opcode: Opcode) -> Result<(), Error> {
    if stack.len() < slots {
        log::error!(
            "Operand stack underflow at {:?}: need {} slots, have {}",
            opcode,
            slots,
            stack.len()
        );
        return Err(Error::StackUnderflow(opcode));
    }
    stack.truncate(stack.len() - slots);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{Insn, MethodNode};
    use crate::jvm::{
        HandleKind, MemberDescriptor, MethodAccessFlags, MethodSignature, Name, ParseDescriptor,
    };
    use FrameValue::*;

    fn header(access: MethodAccessFlags, name: &str, desc: &str) -> MethodHeader {
        let name = if name == "<init>" {
            UnqualifiedName::INIT
        } else {
            UnqualifiedName::from_str(name).unwrap()
        };
        MethodHeader::new(
            BinaryName::from_str("me/Example").unwrap(),
            access,
            MethodSignature::new(name, MethodDescriptor::parse(desc).unwrap()),
        )
    }

    fn analyzer(access: MethodAccessFlags, name: &str, desc: &str) -> FrameAnalyzer<MethodNode> {
        FrameAnalyzer::new(
            &header(access, name, desc),
            LabelArena::new(),
            &Settings::default(),
            MethodNode::new(),
        )
    }

    fn stack_of(analyzer: &FrameAnalyzer<MethodNode>) -> Vec<FrameValue> {
        analyzer.frame().unwrap().stack.clone()
    }

    #[test]
    fn arithmetic() {
        let binops = [
            (Integer, vec![Opcode::IAdd, Opcode::ISub, Opcode::IMul, Opcode::IAnd]),
            (Long, vec![Opcode::LAdd, Opcode::LSub, Opcode::LMul, Opcode::LXor]),
            (Float, vec![Opcode::FAdd, Opcode::FDiv, Opcode::FRem]),
            (Double, vec![Opcode::DAdd, Opcode::DSub, Opcode::DRem]),
        ];

        for (typ, instructions) in binops {
            for instruction in instructions {
                let mut analyzer = analyzer(MethodAccessFlags::STATIC, "f", "()V");
                analyzer
                    .visit_frame(&StackMapFrame::Expanded {
                        locals: vec![],
                        stack: vec![typ.clone(), typ.clone()],
                    })
                    .unwrap();
                let before = analyzer.frame().unwrap().stack.len() as i32;
                analyzer.visit_insn(instruction).unwrap();
                let after = stack_of(&analyzer);
                assert_eq!(
                    after.len() as i32 - before,
                    instruction.stack_delta().unwrap(),
                    "Stack delta of {:?}",
                    instruction
                );
                assert_eq!(Frame::compact(&after), vec![typ.clone()]);

                // Try with a stack that is too small
                let mut analyzer = analyzer_with_stack(vec![]);
                assert!(
                    matches!(
                        analyzer.visit_insn(instruction),
                        Err(Error::StackUnderflow(_))
                    ),
                    "Underflow of {:?}",
                    instruction
                );
            }
        }
    }

    fn analyzer_with_stack(stack: Vec<FrameValue>) -> FrameAnalyzer<MethodNode> {
        let mut analyzer = analyzer(MethodAccessFlags::STATIC, "f", "()V");
        analyzer
            .visit_frame(&StackMapFrame::Expanded {
                locals: vec![],
                stack,
            })
            .unwrap();
        analyzer
    }

    #[test]
    fn constants_then_add() {
        let mut analyzer = analyzer(MethodAccessFlags::STATIC, "f", "()V");
        analyzer.visit_code().unwrap();
        analyzer.visit_insn(Opcode::IConst1).unwrap();
        analyzer.visit_insn(Opcode::IConst2).unwrap();
        analyzer.visit_insn(Opcode::IAdd).unwrap();
        assert_eq!(stack_of(&analyzer), vec![Integer]);
        assert_eq!(
            analyzer.frame_before().unwrap().stack,
            vec![Integer, Integer]
        );
        assert_eq!(analyzer.max_stack(), 2);
    }

    #[test]
    fn unreachable_after_return() {
        let mut analyzer = analyzer(MethodAccessFlags::STATIC, "f", "()V");
        analyzer.visit_insn(Opcode::Return).unwrap();
        assert!(analyzer.frame().is_none());

        // Still unreachable: labels alone do not restore a frame
        let label = LabelArena::new().fresh_label();
        analyzer.visit_label(label).unwrap();
        analyzer.visit_insn(Opcode::Nop).unwrap();
        assert!(analyzer.frame().is_none());

        analyzer
            .visit_frame(&StackMapFrame::Expanded {
                locals: vec![Long],
                stack: vec![],
            })
            .unwrap();
        assert_eq!(analyzer.frame().unwrap().locals, vec![Long, Top]);
    }

    #[test]
    fn rejects_compressed_frames_and_subroutines() {
        let mut analyzer = analyzer(MethodAccessFlags::STATIC, "f", "()V");
        assert!(matches!(
            analyzer.visit_frame(&StackMapFrame::Same),
            Err(Error::CompressedFrame)
        ));
        let label = LabelArena::new().fresh_label();
        assert!(matches!(
            analyzer.visit_jump_insn(Opcode::Jsr, label),
            Err(Error::InvalidInstruction(Opcode::Jsr, _))
        ));
        assert!(matches!(
            analyzer.visit_var_insn(Opcode::Ret, 1),
            Err(Error::InvalidInstruction(Opcode::Ret, _))
        ));
        assert!(matches!(
            analyzer.visit_insn(Opcode::ALoad),
            Err(Error::InvalidEventOpcode { .. })
        ));
    }

    #[test]
    fn locals_and_wide_values() {
        let mut analyzer = analyzer(MethodAccessFlags::STATIC, "f", "(J)V");
        assert_eq!(analyzer.frame().unwrap().locals, vec![Long, Top]);

        // Overwriting the second half of the long kills it
        analyzer.visit_insn(Opcode::IConst0).unwrap();
        analyzer.visit_var_insn(Opcode::IStore, 1).unwrap();
        assert_eq!(analyzer.frame().unwrap().locals, vec![Top, Integer]);

        // Storing past the end grows the locals
        analyzer.visit_insn(Opcode::DConst1).unwrap();
        analyzer.visit_var_insn(Opcode::DStore, 4).unwrap();
        assert_eq!(
            analyzer.frame().unwrap().locals,
            vec![Top, Integer, Top, Top, Double, Top]
        );
        assert_eq!(analyzer.max_locals(), 6);

        analyzer.visit_var_insn(Opcode::ALoad, 9).unwrap();
        assert_eq!(stack_of(&analyzer), vec![Top]);
        assert_eq!(analyzer.max_locals(), 10);

        analyzer.visit_iinc_insn(3, 1).unwrap();
        assert_eq!(analyzer.frame().unwrap().locals[3], Integer);
    }

    #[test]
    fn new_mints_label_and_init_replaces_all() {
        let labels = LabelArena::new();
        let mut analyzer = FrameAnalyzer::new(
            &header(MethodAccessFlags::STATIC, "f", "()V"),
            labels,
            &Settings::default(),
            MethodNode::new(),
        );
        let string = RefType::STRING;
        analyzer.visit_type_insn(Opcode::New, &string).unwrap();
        analyzer.visit_insn(Opcode::Dup).unwrap();
        let stack = stack_of(&analyzer);
        let label = match &stack[0] {
            Uninitialized(label) => *label,
            other => panic!("expected uninitialized value, got {:?}", other),
        };
        assert_eq!(stack, vec![Uninitialized(label), Uninitialized(label)]);
        assert_eq!(analyzer.uninitialized_type(label), Some(&string));

        analyzer
            .visit_method_insn(
                Opcode::InvokeSpecial,
                &string,
                &UnqualifiedName::INIT,
                &MethodDescriptor::parse("()V").unwrap(),
                false,
            )
            .unwrap();
        assert_eq!(stack_of(&analyzer), vec![Object(string)]);

        // The minted label was emitted just before the `new`
        let node = analyzer.into_delegate();
        assert!(matches!(
            &node.instructions[..2],
            [Insn::Label(l), Insn::Type(Opcode::New, _)] if *l == label
        ));
    }

    #[test]
    fn new_reuses_visited_label() {
        let labels = LabelArena::new();
        let before_new = labels.fresh_label();
        let mut analyzer = FrameAnalyzer::new(
            &header(MethodAccessFlags::STATIC, "f", "()V"),
            labels,
            &Settings::default(),
            MethodNode::new(),
        );
        analyzer.visit_label(before_new).unwrap();
        analyzer
            .visit_type_insn(Opcode::New, &RefType::OBJECT)
            .unwrap();
        assert_eq!(stack_of(&analyzer), vec![Uninitialized(before_new)]);
        assert_eq!(analyzer.into_delegate().instructions.len(), 2);
    }

    #[test]
    fn constructor_initializes_this() {
        let mut analyzer = analyzer(MethodAccessFlags::PUBLIC, "<init>", "()V");
        analyzer.visit_var_insn(Opcode::ALoad, 0).unwrap();
        assert_eq!(stack_of(&analyzer), vec![UninitializedThis]);
        analyzer
            .visit_method_insn(
                Opcode::InvokeSpecial,
                &RefType::OBJECT,
                &UnqualifiedName::INIT,
                &MethodDescriptor::parse("()V").unwrap(),
                false,
            )
            .unwrap();
        let this = FrameValue::object(BinaryName::from_str("me/Example").unwrap());
        assert_eq!(analyzer.frame().unwrap().locals, vec![this]);
        assert!(stack_of(&analyzer).is_empty());
    }

    #[test]
    fn array_loads() {
        let strings = RefType::parse_internal("[Ljava/lang/String;").unwrap();
        let mut analyzer = analyzer_with_stack(vec![Object(strings), Integer]);
        analyzer.visit_insn(Opcode::AALoad).unwrap();
        assert_eq!(stack_of(&analyzer), vec![FrameValue::object(BinaryName::STRING)]);

        let mut analyzer = analyzer_with_stack(vec![Null, Integer]);
        analyzer.visit_insn(Opcode::AALoad).unwrap();
        assert_eq!(stack_of(&analyzer), vec![Null]);

        let mut analyzer = analyzer_with_stack(vec![Top, Integer]);
        analyzer.visit_insn(Opcode::AALoad).unwrap();
        assert_eq!(stack_of(&analyzer), vec![FrameValue::object(BinaryName::OBJECT)]);

        let mut analyzer = analyzer_with_stack(vec![Integer]);
        analyzer.visit_int_insn(Opcode::NewArray, 11).unwrap();
        assert_eq!(
            stack_of(&analyzer),
            vec![Object(RefType::parse_internal("[J").unwrap())]
        );
    }

    #[test]
    fn invocations_and_fields() {
        let mut analyzer = analyzer_with_stack(vec![Integer, Long]);
        analyzer
            .visit_method_insn(
                Opcode::InvokeStatic,
                &RefType::OBJECT,
                &UnqualifiedName::from_str("m").unwrap(),
                &MethodDescriptor::parse("(IJ)D").unwrap(),
                false,
            )
            .unwrap();
        assert_eq!(stack_of(&analyzer), vec![Double, Top]);

        analyzer
            .visit_field_insn(
                Opcode::PutStatic,
                &BinaryName::OBJECT,
                &UnqualifiedName::from_str("d").unwrap(),
                &FieldType::double(),
            )
            .unwrap();
        assert!(stack_of(&analyzer).is_empty());

        analyzer
            .visit_ldc_insn(&Constant::String("hi".to_owned()))
            .unwrap();
        analyzer.visit_ldc_insn(&Constant::Long(1)).unwrap();
        assert_eq!(
            stack_of(&analyzer),
            vec![FrameValue::object(BinaryName::STRING), Long, Top]
        );
        assert_eq!(analyzer.max_stack(), 3);
    }

    #[test]
    fn maxs_never_decrease() {
        let mut analyzer = analyzer(MethodAccessFlags::STATIC, "f", "(II)V");
        analyzer.visit_insn(Opcode::LConst0).unwrap();
        analyzer.visit_maxs(1, 1).unwrap();
        let node = analyzer.into_delegate();
        assert_eq!((node.max_stack, node.max_locals), (2, 2));
    }

    #[test]
    fn switches_end_the_block() {
        let labels = LabelArena::new();
        let (l0, l1) = (labels.fresh_label(), labels.fresh_label());
        let mut analyzer = analyzer_with_stack(vec![Integer]);
        analyzer
            .visit_table_switch_insn(0, 0, l0, &[l1])
            .unwrap();
        assert!(analyzer.frame().is_none());
        assert_eq!(analyzer.frame_before().unwrap().stack, vec![Integer]);
    }

    #[test]
    fn stack_delta_mismatch() {
        // A step that pushes where `iadd` should pop
        let bogus_add = |frame: &mut Frame| {
            frame.stack.push(Integer);
            Ok(())
        };

        let mut analyzer = analyzer_with_stack(vec![Integer, Integer]);
        assert!(matches!(
            analyzer.execute(Opcode::IAdd, bogus_add),
            Err(Error::FrameSizeMismatch {
                opcode: Opcode::IAdd,
                expected: -1,
                actual: 1,
            })
        ));

        let settings = Settings {
            check_stack_deltas: false,
            ..Settings::default()
        };
        let mut analyzer = FrameAnalyzer::new(
            &header(MethodAccessFlags::STATIC, "f", "()V"),
            LabelArena::new(),
            &settings,
            MethodNode::new(),
        );
        analyzer.execute(Opcode::IAdd, bogus_add).unwrap();
        assert_eq!(stack_of(&analyzer), vec![Integer]);
    }

    #[test]
    fn init_on_unknown_uninitialized() {
        let label = LabelArena::new().fresh_label();
        let mut analyzer = analyzer_with_stack(vec![Uninitialized(label)]);
        assert!(matches!(
            analyzer.visit_method_insn(
                Opcode::InvokeSpecial,
                &RefType::OBJECT,
                &UnqualifiedName::INIT,
                &MethodDescriptor::parse("()V").unwrap(),
                false,
            ),
            Err(Error::UnknownUninitialized(l)) if l == label
        ));
    }

    #[test]
    fn wide_duplication() {
        let this = UninitializedThis;
        let cases = [
            (Opcode::Dup2, vec![Long, Top], vec![Long, Top, Long, Top]),
            (
                Opcode::Dup2X1,
                vec![Integer, Float, Null],
                vec![Float, Null, Integer, Float, Null],
            ),
            (
                Opcode::Dup2X1,
                vec![Integer, Long, Top],
                vec![Long, Top, Integer, Long, Top],
            ),
            (
                Opcode::Dup2X2,
                vec![Integer, Float, Null, this.clone()],
                vec![Null, this.clone(), Integer, Float, Null, this],
            ),
            (
                Opcode::Dup2X2,
                vec![Double, Top, Long, Top],
                vec![Long, Top, Double, Top, Long, Top],
            ),
            (
                Opcode::Dup2X2,
                vec![Integer, Float, Double, Top],
                vec![Double, Top, Integer, Float, Double, Top],
            ),
        ];
        for (opcode, before, after) in cases {
            let mut analyzer = analyzer_with_stack(before.clone());
            analyzer.visit_insn(opcode).unwrap();
            assert_eq!(stack_of(&analyzer), after, "{:?} on {:?}", opcode, before);

            let mut analyzer = analyzer_with_stack(before[1..].to_vec());
            if opcode != Opcode::Dup2 {
                assert!(matches!(
                    analyzer.visit_insn(opcode),
                    Err(Error::StackUnderflow(o)) if o == opcode
                ));
            }
        }
    }

    #[test]
    fn lookup_switch() {
        let labels = LabelArena::new();
        let (default, one, two) = (
            labels.fresh_label(),
            labels.fresh_label(),
            labels.fresh_label(),
        );
        let mut analyzer = analyzer_with_stack(vec![Long, Top, Integer]);
        analyzer
            .visit_lookup_switch_insn(default, &[1, 2], &[one, two])
            .unwrap();
        assert!(analyzer.frame().is_none());
        assert_eq!(
            analyzer.frame_before().unwrap().stack,
            vec![Long, Top, Integer]
        );
        assert_eq!(
            analyzer.into_delegate().instructions,
            vec![Insn::LookupSwitch {
                default,
                keys: vec![1, 2],
                targets: vec![one, two],
            }]
        );

        let mut analyzer = analyzer_with_stack(vec![]);
        assert!(matches!(
            analyzer.visit_lookup_switch_insn(default, &[1], &[one]),
            Err(Error::StackUnderflow(Opcode::LookupSwitch))
        ));
    }

    #[test]
    fn multi_dimensional_arrays() {
        let cube = RefType::parse_internal("[[[I").unwrap();
        let mut analyzer = analyzer_with_stack(vec![Float, Integer, Integer]);
        analyzer.visit_multi_a_new_array_insn(&cube, 2).unwrap();
        assert_eq!(stack_of(&analyzer), vec![Float, Object(cube.clone())]);

        // Loading from it strips one dimension at a time
        analyzer.visit_insn(Opcode::IConst0).unwrap();
        analyzer.visit_insn(Opcode::AALoad).unwrap();
        assert_eq!(
            stack_of(&analyzer),
            vec![Float, Object(RefType::parse_internal("[[I").unwrap())]
        );

        let mut analyzer = analyzer_with_stack(vec![Integer]);
        assert!(matches!(
            analyzer.visit_multi_a_new_array_insn(&cube, 2),
            Err(Error::StackUnderflow(Opcode::MultiANewArray))
        ));
    }

    fn bootstrap() -> Handle {
        Handle {
            kind: HandleKind::InvokeStatic,
            owner: BinaryName::from_str("me/Bootstrap").unwrap(),
            name: UnqualifiedName::from_str("bsm").unwrap(),
            descriptor: MemberDescriptor::Method(MethodDescriptor::parse("()V").unwrap()),
            is_interface: false,
        }
    }

    #[test]
    fn invoke_dynamic() {
        let name = UnqualifiedName::from_str("run").unwrap();
        let descriptor = MethodDescriptor::parse("(IJ)Ljava/lang/Runnable;").unwrap();

        let mut analyzer = analyzer_with_stack(vec![Integer, Long, Top]);
        analyzer
            .visit_invoke_dynamic_insn(&name, &descriptor, &bootstrap(), &[])
            .unwrap();
        assert_eq!(
            stack_of(&analyzer),
            vec![FrameValue::object(
                BinaryName::from_str("java/lang/Runnable").unwrap()
            )]
        );

        let mut analyzer = FrameAnalyzer::new(
            &header(MethodAccessFlags::STATIC, "f", "()V"),
            LabelArena::new(),
            &Settings::new(ApiVersion::V4),
            MethodNode::new(),
        );
        assert!(matches!(
            analyzer.visit_invoke_dynamic_insn(&name, &descriptor, &bootstrap(), &[]),
            Err(Error::UnsupportedByApi {
                required: ApiVersion::V5,
                declared: ApiVersion::V4,
                ..
            })
        ));
        assert!(analyzer.into_delegate().instructions.is_empty());
    }

    #[test]
    fn instance_fields_and_casts() {
        let count = UnqualifiedName::from_str("count").unwrap();
        let mut analyzer = analyzer_with_stack(vec![FrameValue::object(BinaryName::OBJECT)]);
        analyzer
            .visit_type_insn(Opcode::CheckCast, &RefType::STRING)
            .unwrap();
        assert_eq!(stack_of(&analyzer), vec![FrameValue::object(BinaryName::STRING)]);

        analyzer.visit_insn(Opcode::Dup).unwrap();
        analyzer
            .visit_field_insn(Opcode::GetField, &BinaryName::STRING, &count, &FieldType::long())
            .unwrap();
        assert_eq!(
            stack_of(&analyzer),
            vec![FrameValue::object(BinaryName::STRING), Long, Top]
        );

        analyzer
            .visit_field_insn(Opcode::PutField, &BinaryName::STRING, &count, &FieldType::long())
            .unwrap();
        assert!(stack_of(&analyzer).is_empty());

        let mut analyzer = analyzer_with_stack(vec![Long, Top]);
        assert!(matches!(
            analyzer.visit_field_insn(
                Opcode::PutField,
                &BinaryName::STRING,
                &count,
                &FieldType::long()
            ),
            Err(Error::StackUnderflow(Opcode::PutField))
        ));
    }

    #[test]
    fn unreachable_locals_still_count() {
        let mut analyzer = analyzer(MethodAccessFlags::STATIC, "f", "()V");
        analyzer.visit_insn(Opcode::Return).unwrap();
        assert!(analyzer.frame().is_none());
        analyzer.visit_var_insn(Opcode::LLoad, 4).unwrap();
        assert_eq!(analyzer.max_locals(), 6);
        analyzer.visit_iinc_insn(7, 1).unwrap();
        assert_eq!(analyzer.max_locals(), 8);
    }
}
