use super::{NewLocalFrameType, Settings};
use crate::jvm::code::{ApiVersion, InsnKind, Label, MethodVisitor, Opcode};
use crate::jvm::verifier::{Frame, FrameValue, StackMapFrame};
use crate::jvm::{BaseType, BinaryName, Error, FieldType, MethodHeader, UnqualifiedName};
use crate::util::{Offset, OffsetVec, Width};
use std::collections::HashMap;

/// Pipeline stage that renumbers local variables so that new locals can be inserted
///
/// `this` and the parameters keep their slots. Every other local gets a new slot the first time
/// it is referenced (with a given width), in order of first reference. Locals created with
/// [`LocalsRemapper::new_local`] are allocated from the same counter, so they never collide with
/// remapped locals.
///
/// Locals visited through this stage are in the original numbering. Locals created with
/// `new_local` are already in the new numbering: access them with
/// [`LocalsRemapper::load_local`] and [`LocalsRemapper::store_local`] (or by calling the next
/// stage directly), never by visiting them through this stage.
pub struct LocalsRemapper<V> {
    api: ApiVersion,

    /// First slot after `this` and the parameters
    first_local: usize,

    /// Next unallocated slot in the new numbering
    next_local: usize,

    /// New slot of every original `(slot, width)` seen so far
    remapped: HashMap<(usize, usize), usize>,

    /// Type of every allocated slot (new numbering)
    local_types: HashMap<usize, FieldType<BinaryName>>,

    /// What inserted locals look like in frames, indexed by new slot
    new_local_frame_values: Vec<FrameValue>,

    new_local_frame_type: NewLocalFrameType,

    next: V,
}

impl<V: MethodVisitor> LocalsRemapper<V> {
    pub fn new(header: &MethodHeader, settings: &Settings, next: V) -> LocalsRemapper<V> {
        let first_local = header.first_local();
        LocalsRemapper {
            api: settings.api,
            first_local,
            next_local: first_local,
            remapped: HashMap::new(),
            local_types: HashMap::new(),
            new_local_frame_values: vec![],
            new_local_frame_type: settings.new_local_frame_type,
            next,
        }
    }

    pub fn first_local(&self) -> usize {
        self.first_local
    }

    /// Number of slots used so far in the new numbering
    pub fn next_local(&self) -> usize {
        self.next_local
    }

    /// Override the placeholder used for locals inserted from now on
    pub fn set_new_local_frame_type(&mut self, new_local_frame_type: NewLocalFrameType) {
        self.new_local_frame_type = new_local_frame_type;
    }

    pub fn get_delegate(&mut self) -> &mut V {
        &mut self.next
    }

    pub fn into_delegate(self) -> V {
        self.next
    }

    /// New slot for an original slot holding a value of the given width
    pub fn remap(&mut self, var: u16, width: usize) -> u16 {
        self.remap_typed(var as usize, width, None) as u16
    }

    fn remap_typed(
        &mut self,
        var: usize,
        width: usize,
        typ: Option<FieldType<BinaryName>>,
    ) -> usize {
        if var + width <= self.first_local {
            return var;
        }
        if let Some(&new_var) = self.remapped.get(&(var, width)) {
            return new_var;
        }
        let new_var = self.allocate(width);
        self.remapped.insert((var, width), new_var);
        if let Some(typ) = typ {
            self.local_types.insert(new_var, typ);
        }
        log::trace!("Remapped local {} (width {}) to {}", var, width, new_var);
        new_var
    }

    fn allocate(&mut self, width: usize) -> usize {
        let local = self.next_local;
        self.next_local += width;
        local
    }

    /// Reserve a slot for a brand new local variable (in the new numbering)
    pub fn new_local(&mut self, typ: FieldType<BinaryName>) -> u16 {
        let local = self.allocate(typ.width());
        let frame_value = match self.new_local_frame_type {
            NewLocalFrameType::Top => FrameValue::Top,
            NewLocalFrameType::DeclaredType => FrameValue::from(typ.clone()),
        };
        if self.new_local_frame_values.len() <= local {
            self.new_local_frame_values
                .resize(local + 1, FrameValue::Top);
        }
        self.new_local_frame_values[local] = frame_value;
        log::debug!("Allocated new local {} of type {:?}", local, typ);
        self.local_types.insert(local, typ);
        local as u16
    }

    /// Type of a slot in the new numbering, if it is known
    pub fn local_type(&self, local: u16) -> Option<&FieldType<BinaryName>> {
        self.local_types.get(&(local as usize))
    }

    /// Load a local created with `new_local`
    pub fn load_local(&mut self, local: u16) -> Result<(), Error> {
        let opcode = match self.local_type(local) {
            Some(typ) => load_opcode(typ),
            None => {
                log::error!("Load of local {} which was never allocated", local);
                return Err(Error::UnknownLocal(local));
            }
        };
        self.next.visit_var_insn(opcode, local)
    }

    /// Store the top of the stack into a local created with `new_local`
    pub fn store_local(&mut self, local: u16) -> Result<(), Error> {
        let opcode = match self.local_type(local) {
            Some(typ) => store_opcode(typ),
            None => {
                log::error!("Store to local {} which was never allocated", local);
                return Err(Error::UnknownLocal(local));
            }
        };
        self.next.visit_var_insn(opcode, local)
    }
}

impl<V: MethodVisitor> MethodVisitor for LocalsRemapper<V> {
    fn api(&self) -> ApiVersion {
        self.api
    }

    fn delegate(&mut self) -> Option<&mut dyn MethodVisitor> {
        Some(&mut self.next)
    }

    fn visit_var_insn(&mut self, opcode: Opcode, var: u16) -> Result<(), Error> {
        let typ = match opcode {
            Opcode::ILoad | Opcode::IStore => FieldType::int(),
            Opcode::LLoad | Opcode::LStore => FieldType::long(),
            Opcode::FLoad | Opcode::FStore => FieldType::float(),
            Opcode::DLoad | Opcode::DStore => FieldType::double(),
            Opcode::ALoad | Opcode::AStore | Opcode::Ret => FieldType::object(BinaryName::OBJECT),
            _ => {
                log::error!("Opcode {:?} visited as a local variable instruction", opcode);
                return Err(Error::InvalidEventOpcode {
                    opcode,
                    event: InsnKind::Var,
                });
            }
        };
        let new_var = self.remap_typed(var as usize, typ.width(), Some(typ));
        self.next.visit_var_insn(opcode, new_var as u16)
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<(), Error> {
        let new_var = self.remap_typed(var as usize, 1, Some(FieldType::int()));
        self.next.visit_iinc_insn(new_var as u16, increment)
    }

    fn visit_frame(&mut self, frame: &StackMapFrame) -> Result<(), Error> {
        let (locals, stack) = match frame {
            StackMapFrame::Expanded { locals, stack } => (locals, stack),
            _ => {
                log::error!("Local remapping requires expanded frames, got {:?}", frame);
                return Err(Error::CompressedFrame);
            }
        };

        // Start from the inserted locals, then re-home every live original local
        let mut new_locals: Vec<FrameValue> = self.new_local_frame_values.clone();
        let original: OffsetVec<&FrameValue> = locals.iter().collect();
        for (Offset(old_var), _, value) in original.iter() {
            if **value == FrameValue::Top {
                continue;
            }
            let typ = match frame_value_type(value) {
                Some(typ) => typ,
                None => FieldType::object(BinaryName::OBJECT),
            };
            let new_var = self.remap_typed(old_var, value.width(), Some(typ));
            if new_locals.len() < new_var + value.width() {
                new_locals.resize(new_var + value.width(), FrameValue::Top);
            }
            new_locals[new_var] = (*value).clone();
        }

        // Back to compact form, without the trailing unusable slots
        let mut compact = Frame::compact(&new_locals);
        while compact.last() == Some(&FrameValue::Top) {
            compact.pop();
        }

        self.next.visit_frame(&StackMapFrame::Expanded {
            locals: compact,
            stack: stack.clone(),
        })
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
        let new_index =
            self.remap_typed(index as usize, descriptor.width(), Some(descriptor.clone()));
        self.next
            .visit_local_variable(name, descriptor, signature, start, end, new_index as u16)
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        let max_locals = self.next_local.max(max_locals as usize);
        log::debug!("Remapped locals use {} slots", max_locals);
        self.next.visit_maxs(max_stack, max_locals as u16)
    }
}

/// Type of a local holding this frame value, when there is a sensible one
fn frame_value_type(value: &FrameValue) -> Option<FieldType<BinaryName>> {
    match value {
        FrameValue::Integer => Some(FieldType::int()),
        FrameValue::Float => Some(FieldType::float()),
        FrameValue::Long => Some(FieldType::long()),
        FrameValue::Double => Some(FieldType::double()),
        FrameValue::Object(ref_type) => Some(FieldType::Ref(ref_type.clone())),
        FrameValue::Top
        | FrameValue::Null
        | FrameValue::UninitializedThis
        | FrameValue::Uninitialized(_) => None,
    }
}

fn load_opcode(typ: &FieldType<BinaryName>) -> Opcode {
    match typ {
        FieldType::Base(BaseType::Long) => Opcode::LLoad,
        FieldType::Base(BaseType::Float) => Opcode::FLoad,
        FieldType::Base(BaseType::Double) => Opcode::DLoad,
        FieldType::Base(_) => Opcode::ILoad,
        FieldType::Ref(_) => Opcode::ALoad,
    }
}

fn store_opcode(typ: &FieldType<BinaryName>) -> Opcode {
    match typ {
        FieldType::Base(BaseType::Long) => Opcode::LStore,
        FieldType::Base(BaseType::Float) => Opcode::FStore,
        FieldType::Base(BaseType::Double) => Opcode::DStore,
        FieldType::Base(_) => Opcode::IStore,
        FieldType::Ref(_) => Opcode::AStore,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{Insn, LabelArena, LabelGenerator, MethodNode};
    use crate::jvm::{MethodAccessFlags, MethodDescriptor, MethodSignature, Name, ParseDescriptor};

    fn remapper(access: MethodAccessFlags, desc: &str) -> LocalsRemapper<MethodNode> {
        remapper_with(access, desc, Settings::default())
    }

    fn remapper_with(
        access: MethodAccessFlags,
        desc: &str,
        settings: Settings,
    ) -> LocalsRemapper<MethodNode> {
        let header = MethodHeader::new(
            BinaryName::from_str("me/Example").unwrap(),
            access,
            MethodSignature::new(
                UnqualifiedName::from_str("run").unwrap(),
                MethodDescriptor::parse(desc).unwrap(),
            ),
        );
        LocalsRemapper::new(&header, &settings, MethodNode::new())
    }

    #[test]
    fn parameters_are_not_remapped() {
        let mut remapper = remapper(MethodAccessFlags::PUBLIC, "(IJ)V");
        assert_eq!(remapper.first_local(), 4);
        remapper.visit_var_insn(Opcode::ALoad, 0).unwrap();
        remapper.visit_var_insn(Opcode::ILoad, 1).unwrap();
        remapper.visit_var_insn(Opcode::LLoad, 2).unwrap();
        remapper.visit_maxs(3, 4).unwrap();
        let node = remapper.into_delegate();
        assert_eq!(
            node.instructions,
            vec![
                Insn::Var(Opcode::ALoad, 0),
                Insn::Var(Opcode::ILoad, 1),
                Insn::Var(Opcode::LLoad, 2),
            ]
        );
        assert_eq!(node.max_locals, 4);
    }

    #[test]
    fn new_local_shifts_later_locals() {
        let mut remapper = remapper(MethodAccessFlags::PUBLIC, "(I)V");
        let inserted = remapper.new_local(FieldType::int());
        assert_eq!(inserted, 2);
        assert_eq!(remapper.local_type(inserted), Some(&FieldType::int()));

        remapper.visit_var_insn(Opcode::IStore, 2).unwrap();
        remapper.visit_var_insn(Opcode::DStore, 3).unwrap();
        remapper.visit_iinc_insn(2, 1).unwrap();
        remapper.store_local(inserted).unwrap();
        remapper.load_local(inserted).unwrap();
        remapper.visit_maxs(2, 5).unwrap();

        let node = remapper.into_delegate();
        assert_eq!(
            node.instructions,
            vec![
                Insn::Var(Opcode::IStore, 3),
                Insn::Var(Opcode::DStore, 4),
                Insn::IInc(3, 1),
                Insn::Var(Opcode::IStore, 2),
                Insn::Var(Opcode::ILoad, 2),
            ]
        );
        assert_eq!(node.max_locals, 6);
    }

    #[test]
    fn same_slot_different_widths() {
        let mut remapper = remapper(MethodAccessFlags::STATIC, "()V");
        assert_eq!(remapper.remap(0, 1), 0);
        assert_eq!(remapper.remap(0, 2), 1);
        assert_eq!(remapper.remap(0, 1), 0);
        assert_eq!(remapper.next_local(), 3);
    }

    #[test]
    fn unknown_inserted_local() {
        let mut remapper = remapper(MethodAccessFlags::STATIC, "()V");
        assert!(matches!(
            remapper.load_local(3),
            Err(Error::UnknownLocal(3))
        ));
    }

    #[test]
    fn frames_are_rehomed() {
        let mut remapper = remapper(MethodAccessFlags::STATIC, "(I)V");
        let inserted = remapper.new_local(FieldType::long());
        assert_eq!(inserted, 1);

        remapper
            .visit_frame(&StackMapFrame::Expanded {
                locals: vec![
                    FrameValue::Integer,
                    FrameValue::Double,
                    FrameValue::Top,
                    FrameValue::object(BinaryName::STRING),
                ],
                stack: vec![FrameValue::Integer],
            })
            .unwrap();

        // Slot 0 stays, the double (old 1-2) goes to 3-4, the string (old 4) goes to 5, and the
        // inserted long (1-2) is not live yet
        let node = remapper.into_delegate();
        assert_eq!(
            node.instructions,
            vec![Insn::Frame(StackMapFrame::Expanded {
                locals: vec![
                    FrameValue::Integer,
                    FrameValue::Top,
                    FrameValue::Top,
                    FrameValue::Double,
                    FrameValue::object(BinaryName::STRING),
                ],
                stack: vec![FrameValue::Integer],
            })]
        );
    }

    #[test]
    fn frames_with_declared_new_local_types() {
        let mut settings = Settings::default();
        settings.new_local_frame_type = NewLocalFrameType::DeclaredType;
        let mut remapper = remapper_with(MethodAccessFlags::STATIC, "()V", settings);
        remapper.new_local(FieldType::object(BinaryName::STRING));
        remapper.set_new_local_frame_type(NewLocalFrameType::Top);
        remapper.new_local(FieldType::int());

        remapper
            .visit_frame(&StackMapFrame::Expanded {
                locals: vec![],
                stack: vec![],
            })
            .unwrap();
        let node = remapper.into_delegate();
        assert_eq!(
            node.instructions,
            vec![Insn::Frame(StackMapFrame::Expanded {
                locals: vec![FrameValue::object(BinaryName::STRING)],
                stack: vec![],
            })]
        );
    }

    #[test]
    fn rejects_compressed_frames() {
        let mut remapper = remapper(MethodAccessFlags::STATIC, "()V");
        assert!(matches!(
            remapper.visit_frame(&StackMapFrame::Chop { count: 1 }),
            Err(Error::CompressedFrame)
        ));
    }

    #[test]
    fn debug_ranges_are_remapped() {
        let labels = LabelArena::new();
        let (start, end) = (labels.fresh_label(), labels.fresh_label());
        let mut remapper = remapper(MethodAccessFlags::STATIC, "()V");
        remapper.new_local(FieldType::int());
        remapper
            .visit_local_variable(
                &UnqualifiedName::from_str("x").unwrap(),
                &FieldType::long(),
                None,
                start,
                end,
                0,
            )
            .unwrap();
        let node = remapper.into_delegate();
        assert_eq!(node.local_variables[0].index, 1);
    }

    #[test]
    fn rejects_non_variable_opcodes() {
        let mut remapper = remapper(MethodAccessFlags::STATIC, "()V");
        assert!(matches!(
            remapper.visit_var_insn(Opcode::IAdd, 1),
            Err(Error::InvalidEventOpcode {
                opcode: Opcode::IAdd,
                event: InsnKind::Var,
            })
        ));
        assert!(matches!(
            remapper.visit_var_insn(Opcode::Goto, 0),
            Err(Error::InvalidEventOpcode {
                opcode: Opcode::Goto,
                event: InsnKind::Var,
            })
        ));
        assert!(remapper.into_delegate().instructions.is_empty());
    }
}
