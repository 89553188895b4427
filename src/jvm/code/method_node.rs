use crate::jvm::verifier::StackMapFrame;
use crate::jvm::{
    BinaryName, Constant, Error, FieldType, Handle, MethodDescriptor, RefType, UnqualifiedName,
};

use super::{ApiVersion, InsnKind, Label, MethodVisitor, Opcode};

/// Element of the instruction list of a method body
///
/// Labels, line numbers, and frames are kept inline, at the position where they were visited.
#[derive(Clone, PartialEq, Debug)]
pub enum Insn {
    Label(Label),
    LineNumber(u16, Label),
    Frame(StackMapFrame),
    Insn(Opcode),
    Int(Opcode, i32),
    Var(Opcode, u16),
    Type(Opcode, RefType<BinaryName>),
    Field {
        opcode: Opcode,
        owner: BinaryName,
        name: UnqualifiedName,
        descriptor: FieldType<BinaryName>,
    },
    Method {
        opcode: Opcode,
        owner: RefType<BinaryName>,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
        is_interface: bool,
    },
    InvokeDynamic {
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
        bootstrap_method: Handle,
        bootstrap_arguments: Vec<Constant>,
    },
    Jump(Opcode, Label),
    Ldc(Constant),
    IInc(u16, i16),
    TableSwitch {
        low: i32,
        high: i32,
        default: Label,
        targets: Vec<Label>,
    },
    LookupSwitch {
        default: Label,
        keys: Vec<i32>,
        targets: Vec<Label>,
    },
    MultiANewArray(RefType<BinaryName>, u8),
}

impl Insn {
    /// Opcode of the instruction, or `None` for labels, line numbers, and frames
    pub fn opcode(&self) -> Option<Opcode> {
        Some(match self {
            Insn::Label(_) | Insn::LineNumber(..) | Insn::Frame(_) => return None,
            Insn::Insn(opcode)
            | Insn::Int(opcode, _)
            | Insn::Var(opcode, _)
            | Insn::Type(opcode, _)
            | Insn::Jump(opcode, _)
            | Insn::Field { opcode, .. }
            | Insn::Method { opcode, .. } => *opcode,
            Insn::InvokeDynamic { .. } => Opcode::InvokeDynamic,
            Insn::Ldc(_) => Opcode::Ldc,
            Insn::IInc(..) => Opcode::IInc,
            Insn::TableSwitch { .. } => Opcode::TableSwitch,
            Insn::LookupSwitch { .. } => Opcode::LookupSwitch,
            Insn::MultiANewArray(..) => Opcode::MultiANewArray,
        })
    }

    /// Replay this element as a visitor event
    pub fn accept(&self, visitor: &mut dyn MethodVisitor) -> Result<(), Error> {
        match self {
            Insn::Label(label) => visitor.visit_label(*label),
            Insn::LineNumber(line, start) => visitor.visit_line_number(*line, *start),
            Insn::Frame(frame) => visitor.visit_frame(frame),
            Insn::Insn(opcode) => visitor.visit_insn(*opcode),
            Insn::Int(opcode, operand) => visitor.visit_int_insn(*opcode, *operand),
            Insn::Var(opcode, var) => visitor.visit_var_insn(*opcode, *var),
            Insn::Type(opcode, typ) => visitor.visit_type_insn(*opcode, typ),
            Insn::Field {
                opcode,
                owner,
                name,
                descriptor,
            } => visitor.visit_field_insn(*opcode, owner, name, descriptor),
            Insn::Method {
                opcode,
                owner,
                name,
                descriptor,
                is_interface,
            } => visitor.visit_method_insn(*opcode, owner, name, descriptor, *is_interface),
            Insn::InvokeDynamic {
                name,
                descriptor,
                bootstrap_method,
                bootstrap_arguments,
            } => visitor.visit_invoke_dynamic_insn(
                name,
                descriptor,
                bootstrap_method,
                bootstrap_arguments,
            ),
            Insn::Jump(opcode, label) => visitor.visit_jump_insn(*opcode, *label),
            Insn::Ldc(constant) => visitor.visit_ldc_insn(constant),
            Insn::IInc(var, increment) => visitor.visit_iinc_insn(*var, *increment),
            Insn::TableSwitch {
                low,
                high,
                default,
                targets,
            } => visitor.visit_table_switch_insn(*low, *high, *default, targets),
            Insn::LookupSwitch {
                default,
                keys,
                targets,
            } => visitor.visit_lookup_switch_insn(*default, keys, targets),
            Insn::MultiANewArray(typ, dimensions) => {
                visitor.visit_multi_a_new_array_insn(typ, *dimensions)
            }
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TryCatchBlock {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    pub catch_type: Option<BinaryName>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LocalVariable {
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
    pub signature: Option<String>,
    pub start: Label,
    pub end: Label,
    pub index: u16,
}

/// In-memory method body, recorded from visitor events
///
/// Replaying with [`MethodNode::accept`] produces the canonical event order: `visit_code`, all
/// try/catch blocks, the instruction list, local variables, `visit_maxs`, then `visit_end`.
#[derive(Clone, PartialEq, Debug)]
pub struct MethodNode {
    api: ApiVersion,
    pub instructions: Vec<Insn>,
    pub try_catch_blocks: Vec<TryCatchBlock>,
    pub local_variables: Vec<LocalVariable>,
    pub max_stack: u16,
    pub max_locals: u16,
}

impl MethodNode {
    pub fn new() -> MethodNode {
        MethodNode::with_api(ApiVersion::LATEST)
    }

    pub fn with_api(api: ApiVersion) -> MethodNode {
        MethodNode {
            api,
            instructions: vec![],
            try_catch_blocks: vec![],
            local_variables: vec![],
            max_stack: 0,
            max_locals: 0,
        }
    }

    /// Instructions only (skipping labels, line numbers, and frames)
    pub fn opcodes(&self) -> Vec<Opcode> {
        self.instructions.iter().filter_map(Insn::opcode).collect()
    }

    /// Replay the recorded method body into another visitor
    pub fn accept(&self, visitor: &mut dyn MethodVisitor) -> Result<(), Error> {
        visitor.visit_code()?;
        for block in &self.try_catch_blocks {
            visitor.visit_try_catch_block(
                block.start,
                block.end,
                block.handler,
                block.catch_type.as_ref(),
            )?;
        }
        for insn in &self.instructions {
            insn.accept(visitor)?;
        }
        for local in &self.local_variables {
            visitor.visit_local_variable(
                &local.name,
                &local.descriptor,
                local.signature.as_deref(),
                local.start,
                local.end,
                local.index,
            )?;
        }
        visitor.visit_maxs(self.max_stack, self.max_locals)?;
        visitor.visit_end()
    }

    fn check_kind(opcode: Opcode, event: InsnKind) -> Result<(), Error> {
        if opcode.kind() == event {
            Ok(())
        } else {
            log::error!("Opcode {:?} visited as a {:?} instruction", opcode, event);
            Err(Error::InvalidEventOpcode { opcode, event })
        }
    }
}

impl Default for MethodNode {
    fn default() -> MethodNode {
        MethodNode::new()
    }
}

impl MethodVisitor for MethodNode {
    fn api(&self) -> ApiVersion {
        self.api
    }

    fn visit_frame(&mut self, frame: &StackMapFrame) -> Result<(), Error> {
        self.instructions.push(Insn::Frame(frame.clone()));
        Ok(())
    }

    fn visit_insn(&mut self, opcode: Opcode) -> Result<(), Error> {
        Self::check_kind(opcode, InsnKind::Insn)?;
        self.instructions.push(Insn::Insn(opcode));
        Ok(())
    }

    fn visit_int_insn(&mut self, opcode: Opcode, operand: i32) -> Result<(), Error> {
        Self::check_kind(opcode, InsnKind::Int)?;
        self.instructions.push(Insn::Int(opcode, operand));
        Ok(())
    }

    fn visit_var_insn(&mut self, opcode: Opcode, var: u16) -> Result<(), Error> {
        Self::check_kind(opcode, InsnKind::Var)?;
        self.instructions.push(Insn::Var(opcode, var));
        Ok(())
    }

    fn visit_type_insn(&mut self, opcode: Opcode, typ: &RefType<BinaryName>) -> Result<(), Error> {
        Self::check_kind(opcode, InsnKind::Type)?;
        self.instructions.push(Insn::Type(opcode, typ.clone()));
        Ok(())
    }

    fn visit_field_insn(
        &mut self,
        opcode: Opcode,
        owner: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &FieldType<BinaryName>,
    ) -> Result<(), Error> {
        Self::check_kind(opcode, InsnKind::Field)?;
        self.instructions.push(Insn::Field {
            opcode,
            owner: owner.clone(),
            name: name.clone(),
            descriptor: descriptor.clone(),
        });
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
        Self::check_kind(opcode, InsnKind::Method)?;
        self.instructions.push(Insn::Method {
            opcode,
            owner: owner.clone(),
            name: name.clone(),
            descriptor: descriptor.clone(),
            is_interface,
        });
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
        self.instructions.push(Insn::InvokeDynamic {
            name: name.clone(),
            descriptor: descriptor.clone(),
            bootstrap_method: bootstrap_method.clone(),
            bootstrap_arguments: bootstrap_arguments.to_vec(),
        });
        Ok(())
    }

    fn visit_jump_insn(&mut self, opcode: Opcode, label: Label) -> Result<(), Error> {
        Self::check_kind(opcode, InsnKind::Jump)?;
        self.instructions.push(Insn::Jump(opcode, label));
        Ok(())
    }

    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        self.instructions.push(Insn::Label(label));
        Ok(())
    }

    fn visit_ldc_insn(&mut self, constant: &Constant) -> Result<(), Error> {
        self.api.check_ldc(constant)?;
        self.instructions.push(Insn::Ldc(constant.clone()));
        Ok(())
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<(), Error> {
        self.instructions.push(Insn::IInc(var, increment));
        Ok(())
    }

    fn visit_table_switch_insn(
        &mut self,
        low: i32,
        high: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), Error> {
        self.instructions.push(Insn::TableSwitch {
            low,
            high,
            default,
            targets: targets.to_vec(),
        });
        Ok(())
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        keys: &[i32],
        targets: &[Label],
    ) -> Result<(), Error> {
        self.instructions.push(Insn::LookupSwitch {
            default,
            keys: keys.to_vec(),
            targets: targets.to_vec(),
        });
        Ok(())
    }

    fn visit_multi_a_new_array_insn(
        &mut self,
        typ: &RefType<BinaryName>,
        dimensions: u8,
    ) -> Result<(), Error> {
        self.instructions
            .push(Insn::MultiANewArray(typ.clone(), dimensions));
        Ok(())
    }

    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&BinaryName>,
    ) -> Result<(), Error> {
        self.try_catch_blocks.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type: catch_type.cloned(),
        });
        Ok(())
    }

    fn visit_local_variable(
        &mut self,
        name: &UnqualifiedName,
        descriptor: &FieldType<BinaryName>,
        signature: Option<&str>,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), Error> {
        self.local_variables.push(LocalVariable {
            name: name.clone(),
            descriptor: descriptor.clone(),
            signature: signature.map(str::to_owned),
            start,
            end,
            index,
        });
        Ok(())
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        self.instructions.push(Insn::LineNumber(line, start));
        Ok(())
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        self.max_stack = max_stack;
        self.max_locals = max_locals;
        Ok(())
    }
}
