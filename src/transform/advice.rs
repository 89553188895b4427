use super::Settings;
use crate::jvm::code::{ApiVersion, InsnKind, Label, MethodVisitor, Opcode};
use crate::jvm::{
    BinaryName, Constant, Error, FieldType, Handle, MethodDescriptor, MethodHeader, RefType,
    UnqualifiedName,
};
use crate::util::Width;
use std::collections::HashMap;

/// Code to inject at the entry and exits of a method
///
/// The callbacks get the next stage of the pipeline, so they can emit instructions (or, when the
/// next stage is a [`super::LocalsRemapper`], allocate fresh locals first).
pub trait Advice<V> {
    /// Called at the start of the method, or right after the superclass constructor call in a
    /// constructor
    fn on_method_enter(&mut self, next: &mut V) -> Result<(), Error> {
        let _ = next;
        Ok(())
    }

    /// Called just before a return or `athrow` instruction
    fn on_method_exit(&mut self, opcode: Opcode, next: &mut V) -> Result<(), Error> {
        let _ = (opcode, next);
        Ok(())
    }
}

/// Value on the operand stack, as far as finding the superclass constructor call is concerned
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Tracked {
    UninitializedThis,
    Other,
}

/// Pipeline stage that fires [`Advice`] callbacks on method entry and exit
///
/// In a constructor, "entry" is just after the call to the superclass constructor (or to another
/// constructor of the same class). Finding it requires following which stack values may be the
/// uninitialized `this`, along every path that has not yet called it. Each such path fires entry
/// exactly once.
///
/// Tracking only needs to be precise until the superclass constructor call: the stack is a list
/// of slots (so `long` and `double` take two), each either the uninitialized `this` or something
/// else. A forward jump saves the stack for its target label; arriving at that label restores it
/// and goes back to "before the superclass constructor call". Every exception handler is assumed
/// to start before the superclass constructor call with just the exception on the stack.
pub struct AdviceAdapter<V, A> {
    api: ApiVersion,
    is_constructor: bool,

    /// Always true outside of constructors
    super_constructor_called: bool,

    /// Simulated stack, only meaningful before the superclass constructor call
    stack: Vec<Tracked>,

    /// Stacks saved for the targets of forward jumps
    forward_jumps: HashMap<Label, Vec<Tracked>>,

    advice: A,
    next: V,
}

impl<V: MethodVisitor, A: Advice<V>> AdviceAdapter<V, A> {
    pub fn new(header: &MethodHeader, settings: &Settings, advice: A, next: V) -> Self {
        let is_constructor = header.is_constructor();
        AdviceAdapter {
            api: settings.api,
            is_constructor,
            super_constructor_called: !is_constructor,
            stack: vec![],
            forward_jumps: HashMap::new(),
            advice,
            next,
        }
    }

    /// Has the superclass constructor been called on the current path?
    pub fn is_super_constructor_called(&self) -> bool {
        self.super_constructor_called
    }

    pub fn advice(&self) -> &A {
        &self.advice
    }

    pub fn advice_mut(&mut self) -> &mut A {
        &mut self.advice
    }

    pub fn get_delegate(&mut self) -> &mut V {
        &mut self.next
    }

    pub fn into_delegate(self) -> V {
        self.next
    }

    pub fn into_parts(self) -> (A, V) {
        (self.advice, self.next)
    }

    /// Still looking for the superclass constructor call on this path
    fn tracking(&self) -> bool {
        self.is_constructor && !self.super_constructor_called
    }

    fn enter(&mut self) -> Result<(), Error> {
        log::debug!("Firing method entry advice");
        self.advice.on_method_enter(&mut self.next)
    }

    fn exit(&mut self, opcode: Opcode) -> Result<(), Error> {
        log::debug!("Firing method exit advice before {:?}", opcode);
        self.advice.on_method_exit(opcode, &mut self.next)
    }

    /// Next instruction is only reachable by a jump
    ///
    /// If it is reached by a forward jump from before the superclass constructor call, the label
    /// will restore the tracking state. Otherwise (backward jumps or dead code), the superclass
    /// constructor must already have been called.
    fn end_block(&mut self) {
        self.super_constructor_called = true;
    }

    fn add_forward_jump(&mut self, label: Label) {
        if !self.forward_jumps.contains_key(&label) {
            self.forward_jumps.insert(label, self.stack.clone());
        }
    }

    fn pop(&mut self, opcode: Opcode) -> Result<Tracked, Error> {
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => {
                log::error!("Stack underflow while looking for the superclass constructor call");
                Err(Error::StackUnderflow(opcode))
            }
        }
    }

    fn pop_n(&mut self, n: usize, opcode: Opcode) -> Result<(), Error> {
        for _ in 0..n {
            self.pop(opcode)?;
        }
        Ok(())
    }

    fn push_others(&mut self, n: usize) {
        for _ in 0..n {
            self.stack.push(Tracked::Other);
        }
    }

    /// Copy the top `copied` slots below the next `skipped` slots
    fn dup(&mut self, copied: usize, skipped: usize, opcode: Opcode) -> Result<(), Error> {
        let len = self.stack.len();
        if len < copied + skipped {
            log::error!("Stack underflow while looking for the superclass constructor call");
            return Err(Error::StackUnderflow(opcode));
        }
        let top: Vec<Tracked> = self.stack[len - copied..].to_vec();
        let at = len - copied - skipped;
        self.stack.splice(at..at, top);
        Ok(())
    }

    fn invoke(
        &mut self,
        opcode: Opcode,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Result<(), Error> {
        self.pop_n(descriptor.parameter_length(false), opcode)?;
        match opcode {
            Opcode::InvokeVirtual | Opcode::InvokeInterface => {
                self.pop(opcode)?;
            }
            Opcode::InvokeSpecial => {
                let receiver = self.pop(opcode)?;
                if receiver == Tracked::UninitializedThis && name.is_constructor() {
                    self.super_constructor_called = true;
                    self.enter()?;
                }
            }
            _ => (),
        }
        self.push_others(descriptor.return_length());
        Ok(())
    }

    fn invalid(opcode: Opcode, event: InsnKind) -> Error {
        log::error!("Opcode {:?} visited as a {:?} instruction", opcode, event);
        Error::InvalidEventOpcode { opcode, event }
    }
}

impl<V: MethodVisitor, A: Advice<V>> MethodVisitor for AdviceAdapter<V, A> {
    fn api(&self) -> ApiVersion {
        self.api
    }

    fn delegate(&mut self) -> Option<&mut dyn MethodVisitor> {
        Some(&mut self.next)
    }

    fn visit_code(&mut self) -> Result<(), Error> {
        self.next.visit_code()?;
        if !self.is_constructor {
            self.enter()?;
        }
        Ok(())
    }

    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        self.next.visit_label(label)?;
        if self.is_constructor {
            if let Some(stack) = self.forward_jumps.remove(&label) {
                log::trace!("Resuming tracking at {:?} with {:?}", label, stack);
                self.stack = stack;
                self.super_constructor_called = false;
            }
        }
        Ok(())
    }

    fn visit_insn(&mut self, opcode: Opcode) -> Result<(), Error> {
        if self.tracking() {
            match opcode {
                Opcode::IReturn
                | Opcode::LReturn
                | Opcode::FReturn
                | Opcode::DReturn
                | Opcode::AReturn => {
                    log::error!("{:?} before the superclass constructor call", opcode);
                    return Err(Error::ReturnInConstructor(opcode));
                }
                Opcode::Return => {
                    self.exit(opcode)?;
                    self.end_block();
                }
                Opcode::AThrow => {
                    self.pop(opcode)?;
                    self.exit(opcode)?;
                    self.end_block();
                }
                Opcode::Dup => self.dup(1, 0, opcode)?,
                Opcode::DupX1 => self.dup(1, 1, opcode)?,
                Opcode::DupX2 => self.dup(1, 2, opcode)?,
                Opcode::Dup2 => self.dup(2, 0, opcode)?,
                Opcode::Dup2X1 => self.dup(2, 1, opcode)?,
                Opcode::Dup2X2 => self.dup(2, 2, opcode)?,
                Opcode::Swap => {
                    let first = self.pop(opcode)?;
                    let second = self.pop(opcode)?;
                    self.stack.push(first);
                    self.stack.push(second);
                }
                _ => match insn_effect(opcode) {
                    Some((popped, pushed)) => {
                        self.pop_n(popped, opcode)?;
                        self.push_others(pushed);
                    }
                    None => return Err(Self::invalid(opcode, InsnKind::Insn)),
                },
            }
        } else if opcode.is_return() || opcode == Opcode::AThrow {
            self.exit(opcode)?;
        }
        self.next.visit_insn(opcode)
    }

    fn visit_int_insn(&mut self, opcode: Opcode, operand: i32) -> Result<(), Error> {
        self.next.visit_int_insn(opcode, operand)?;
        if self.tracking() && opcode != Opcode::NewArray {
            self.stack.push(Tracked::Other);
        }
        Ok(())
    }

    fn visit_var_insn(&mut self, opcode: Opcode, var: u16) -> Result<(), Error> {
        self.next.visit_var_insn(opcode, var)?;
        if self.tracking() {
            match opcode {
                Opcode::ILoad | Opcode::FLoad => self.push_others(1),
                Opcode::LLoad | Opcode::DLoad => self.push_others(2),
                Opcode::ALoad if var == 0 => self.stack.push(Tracked::UninitializedThis),
                Opcode::ALoad => self.push_others(1),
                Opcode::IStore | Opcode::FStore | Opcode::AStore => self.pop_n(1, opcode)?,
                Opcode::LStore | Opcode::DStore => self.pop_n(2, opcode)?,
                Opcode::Ret => self.end_block(),
                _ => return Err(Self::invalid(opcode, InsnKind::Var)),
            }
        }
        Ok(())
    }

    fn visit_type_insn(&mut self, opcode: Opcode, typ: &RefType<BinaryName>) -> Result<(), Error> {
        self.next.visit_type_insn(opcode, typ)?;
        if self.tracking() {
            match opcode {
                Opcode::New => self.push_others(1),
                Opcode::ANewArray | Opcode::InstanceOf => {
                    self.pop(opcode)?;
                    self.push_others(1);
                }
                // A cast `this` is still `this`
                Opcode::CheckCast => (),
                _ => return Err(Self::invalid(opcode, InsnKind::Type)),
            }
        }
        Ok(())
    }

    fn visit_field_insn(
        &mut self,
        opcode: Opcode,
        owner: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &FieldType<BinaryName>,
    ) -> Result<(), Error> {
        self.next.visit_field_insn(opcode, owner, name, descriptor)?;
        if self.tracking() {
            let width = descriptor.width();
            match opcode {
                Opcode::GetStatic => self.push_others(width),
                Opcode::PutStatic => self.pop_n(width, opcode)?,
                Opcode::GetField => {
                    self.pop(opcode)?;
                    self.push_others(width);
                }
                Opcode::PutField => self.pop_n(width + 1, opcode)?,
                _ => return Err(Self::invalid(opcode, InsnKind::Field)),
            }
        }
        Ok(())
    }

    fn visit_method_insn(
        &mut self,
        opcode: Opcode,
        owner: &RefType<BinaryName>,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
        is_interface: bool,
    ) -> Result<(), Error> {
        self.next
            .visit_method_insn(opcode, owner, name, descriptor, is_interface)?;
        if self.tracking() {
            self.invoke(opcode, name, descriptor)?;
        }
        Ok(())
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
        if self.tracking() {
            self.invoke(Opcode::InvokeDynamic, name, descriptor)?;
        }
        Ok(())
    }

    fn visit_jump_insn(&mut self, opcode: Opcode, label: Label) -> Result<(), Error> {
        self.next.visit_jump_insn(opcode, label)?;
        if self.tracking() {
            match opcode {
                Opcode::IfEq
                | Opcode::IfNe
                | Opcode::IfLt
                | Opcode::IfGe
                | Opcode::IfGt
                | Opcode::IfLe
                | Opcode::IfNull
                | Opcode::IfNonNull => self.pop_n(1, opcode)?,
                Opcode::IfICmpEq
                | Opcode::IfICmpNe
                | Opcode::IfICmpLt
                | Opcode::IfICmpGe
                | Opcode::IfICmpGt
                | Opcode::IfICmpLe
                | Opcode::IfACmpEq
                | Opcode::IfACmpNe => self.pop_n(2, opcode)?,
                Opcode::Jsr => self.push_others(1),
                Opcode::Goto => self.end_block(),
                _ => return Err(Self::invalid(opcode, InsnKind::Jump)),
            }
            self.add_forward_jump(label);
        }
        Ok(())
    }

    fn visit_ldc_insn(&mut self, constant: &Constant) -> Result<(), Error> {
        self.api.check_ldc(constant)?;
        self.next.visit_ldc_insn(constant)?;
        if self.tracking() {
            self.push_others(constant.width());
        }
        Ok(())
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
        if self.tracking() {
            self.pop(Opcode::TableSwitch)?;
            self.add_forward_jump(default);
            for target in targets {
                self.add_forward_jump(*target);
            }
            self.end_block();
        }
        Ok(())
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        keys: &[i32],
        targets: &[Label],
    ) -> Result<(), Error> {
        self.next.visit_lookup_switch_insn(default, keys, targets)?;
        if self.tracking() {
            self.pop(Opcode::LookupSwitch)?;
            self.add_forward_jump(default);
            for target in targets {
                self.add_forward_jump(*target);
            }
            self.end_block();
        }
        Ok(())
    }

    fn visit_multi_a_new_array_insn(
        &mut self,
        typ: &RefType<BinaryName>,
        dimensions: u8,
    ) -> Result<(), Error> {
        self.next.visit_multi_a_new_array_insn(typ, dimensions)?;
        if self.tracking() {
            self.pop_n(dimensions as usize, Opcode::MultiANewArray)?;
            self.push_others(1);
        }
        Ok(())
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&BinaryName>,
    ) -> Result<(), Error> {
        self.next
            .visit_try_catch_block(start, end, handler, catch_type)?;

        // Try/catch blocks come before their labels, so there is no knowing yet whether the
        // protected range is before the superclass constructor call. Assume it is: a handler
        // cannot call the superclass constructor a second time anyway.
        if self.is_constructor && !self.forward_jumps.contains_key(&handler) {
            self.forward_jumps.insert(handler, vec![Tracked::Other]);
        }
        Ok(())
    }
}

/// Slots popped and pushed by the instructions without operands that just consume and produce
/// plain values
fn insn_effect(opcode: Opcode) -> Option<(usize, usize)> {
    use Opcode::*;
    let effect = match opcode {
        Nop => (0, 0),
        AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5
        | FConst0 | FConst1 | FConst2 => (0, 1),
        LConst0 | LConst1 | DConst0 | DConst1 => (0, 2),

        IALoad | FALoad | AALoad | BALoad | CALoad | SALoad => (2, 1),
        LALoad | DALoad => (2, 2),
        IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => (3, 0),
        LAStore | DAStore => (4, 0),
        Pop => (1, 0),
        Pop2 => (2, 0),

        IAdd | FAdd | ISub | FSub | IMul | FMul | IDiv | FDiv | IRem | FRem | IShl | IShr
        | IUShr | IAnd | IOr | IXor => (2, 1),
        LAdd | DAdd | LSub | DSub | LMul | DMul | LDiv | DDiv | LRem | DRem | LAnd | LOr
        | LXor => (4, 2),
        LShl | LShr | LUShr => (3, 2),
        INeg | FNeg => (1, 1),
        LNeg | DNeg => (2, 2),

        I2L | I2D | F2L | F2D => (1, 2),
        I2F | F2I | I2B | I2C | I2S => (1, 1),
        L2D | D2L => (2, 2),
        L2I | L2F | D2I | D2F => (2, 1),
        LCmp | DCmpL | DCmpG => (4, 1),
        FCmpL | FCmpG => (2, 1),

        ArrayLength => (1, 1),
        MonitorEnter | MonitorExit => (1, 0),
        _ => return None,
    };
    Some(effect)
}
