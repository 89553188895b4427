use crate::jvm::{
    BinaryName, Constant, Error, FieldType, Handle, MethodDescriptor, RefType, UnqualifiedName,
};
use crate::jvm::verifier::StackMapFrame;

use super::{Label, Opcode};

/// Version of the visitor API a stage was written against
///
/// Events using features newer than the declared version are rejected instead of being silently
/// dropped or mishandled.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ApiVersion {
    V4,
    /// Method handles, method types, and `invokedynamic`
    V5,
    V6,
    /// Dynamically-computed constants
    V7,
    V8,
    V9,
}

impl ApiVersion {
    pub const LATEST: ApiVersion = ApiVersion::V9;

    /// Fail if `self` is older than `required`
    pub fn require(self, feature: &'static str, required: ApiVersion) -> Result<(), Error> {
        if self < required {
            log::error!(
                "{} requires API {:?}, visitor declared {:?}",
                feature,
                required,
                self
            );
            Err(Error::UnsupportedByApi {
                feature,
                required,
                declared: self,
            })
        } else {
            Ok(())
        }
    }

    /// Check that a constant can be loaded under this API version
    pub fn check_ldc(self, constant: &Constant) -> Result<(), Error> {
        match constant {
            Constant::MethodHandle(_) => self.require("method handle constants", ApiVersion::V5),
            Constant::MethodType(_) => self.require("method type constants", ApiVersion::V5),
            Constant::Dynamic(_) => self.require("dynamic constants", ApiVersion::V7),
            _ => Ok(()),
        }
    }

    pub fn check_invoke_dynamic(self) -> Result<(), Error> {
        self.require("invokedynamic", ApiVersion::V5)
    }
}

impl Default for ApiVersion {
    fn default() -> ApiVersion {
        ApiVersion::LATEST
    }
}

/// Consumer of the events making up a method body
///
/// Events arrive in this order:
///
///   - `visit_code`
///   - instructions, labels, frames, line numbers, and try/catch blocks (a try/catch block must
///     be visited before the labels it mentions)
///   - local variable debug ranges
///   - `visit_maxs`
///   - `visit_end`
///
/// Every event has a default body that forwards to `delegate()`, so a stage in a pipeline only
/// needs to override the events it cares about. Stages that own a successor return it from
/// `delegate()`, and terminal consumers leave the default `None`.
pub trait MethodVisitor {
    /// API version the visitor was written against
    fn api(&self) -> ApiVersion {
        ApiVersion::LATEST
    }

    /// Next visitor in the pipeline
    fn delegate(&mut self) -> Option<&mut dyn MethodVisitor> {
        None
    }

    fn visit_code(&mut self) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_code(),
            None => Ok(()),
        }
    }

    fn visit_frame(&mut self, frame: &StackMapFrame) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_frame(frame),
            None => Ok(()),
        }
    }

    /// Instruction with no operand
    fn visit_insn(&mut self, opcode: Opcode) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_insn(opcode),
            None => Ok(()),
        }
    }

    /// `bipush`, `sipush`, or `newarray` (where the operand is the array type code)
    fn visit_int_insn(&mut self, opcode: Opcode, operand: i32) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_int_insn(opcode, operand),
            None => Ok(()),
        }
    }

    /// Load, store, or `ret` on a local variable slot
    fn visit_var_insn(&mut self, opcode: Opcode, var: u16) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_var_insn(opcode, var),
            None => Ok(()),
        }
    }

    /// `new`, `anewarray`, `checkcast`, or `instanceof`
    fn visit_type_insn(&mut self, opcode: Opcode, typ: &RefType<BinaryName>) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_type_insn(opcode, typ),
            None => Ok(()),
        }
    }

    fn visit_field_insn(
        &mut self,
        opcode: Opcode,
        owner: &BinaryName,
        name: &UnqualifiedName,
        descriptor: &FieldType<BinaryName>,
    ) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_field_insn(opcode, owner, name, descriptor),
            None => Ok(()),
        }
    }

    fn visit_method_insn(
        &mut self,
        opcode: Opcode,
        owner: &RefType<BinaryName>,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
        is_interface: bool,
    ) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_method_insn(opcode, owner, name, descriptor, is_interface),
            None => Ok(()),
        }
    }

    fn visit_invoke_dynamic_insn(
        &mut self,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
        bootstrap_method: &Handle,
        bootstrap_arguments: &[Constant],
    ) -> Result<(), Error> {
        self.api().check_invoke_dynamic()?;
        match self.delegate() {
            Some(next) => next.visit_invoke_dynamic_insn(
                name,
                descriptor,
                bootstrap_method,
                bootstrap_arguments,
            ),
            None => Ok(()),
        }
    }

    fn visit_jump_insn(&mut self, opcode: Opcode, label: Label) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_jump_insn(opcode, label),
            None => Ok(()),
        }
    }

    /// Place a label just before the next instruction
    fn visit_label(&mut self, label: Label) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_label(label),
            None => Ok(()),
        }
    }

    fn visit_ldc_insn(&mut self, constant: &Constant) -> Result<(), Error> {
        self.api().check_ldc(constant)?;
        match self.delegate() {
            Some(next) => next.visit_ldc_insn(constant),
            None => Ok(()),
        }
    }

    fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_iinc_insn(var, increment),
            None => Ok(()),
        }
    }

    fn visit_table_switch_insn(
        &mut self,
        low: i32,
        high: i32,
        default: Label,
        targets: &[Label],
    ) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_table_switch_insn(low, high, default, targets),
            None => Ok(()),
        }
    }

    fn visit_lookup_switch_insn(
        &mut self,
        default: Label,
        keys: &[i32],
        targets: &[Label],
    ) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_lookup_switch_insn(default, keys, targets),
            None => Ok(()),
        }
    }

    fn visit_multi_a_new_array_insn(
        &mut self,
        typ: &RefType<BinaryName>,
        dimensions: u8,
    ) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_multi_a_new_array_insn(typ, dimensions),
            None => Ok(()),
        }
    }

    /// Exception handler covering `[start, end)`, catching `catch_type` (everything if `None`)
    fn visit_try_catch_block(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&BinaryName>,
    ) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_try_catch_block(start, end, handler, catch_type),
            None => Ok(()),
        }
    }

    /// Debug range of a local variable
    fn visit_local_variable(
        &mut self,
        name: &UnqualifiedName,
        descriptor: &FieldType<BinaryName>,
        signature: Option<&str>,
        start: Label,
        end: Label,
        index: u16,
    ) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => {
                next.visit_local_variable(name, descriptor, signature, start, end, index)
            }
            None => Ok(()),
        }
    }

    fn visit_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_line_number(line, start),
            None => Ok(()),
        }
    }

    fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_maxs(max_stack, max_locals),
            None => Ok(()),
        }
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_end(),
            None => Ok(()),
        }
    }
}

/// Forward every event to the visitor behind a pointer
macro_rules! forward_method_visitor {
    ($($impl_header:tt)*) => {
        $($impl_header)* {
            fn api(&self) -> ApiVersion {
                (**self).api()
            }

            fn delegate(&mut self) -> Option<&mut dyn MethodVisitor> {
                (**self).delegate()
            }

            fn visit_code(&mut self) -> Result<(), Error> {
                (**self).visit_code()
            }

            fn visit_frame(&mut self, frame: &StackMapFrame) -> Result<(), Error> {
                (**self).visit_frame(frame)
            }

            fn visit_insn(&mut self, opcode: Opcode) -> Result<(), Error> {
                (**self).visit_insn(opcode)
            }

            fn visit_int_insn(&mut self, opcode: Opcode, operand: i32) -> Result<(), Error> {
                (**self).visit_int_insn(opcode, operand)
            }

            fn visit_var_insn(&mut self, opcode: Opcode, var: u16) -> Result<(), Error> {
                (**self).visit_var_insn(opcode, var)
            }

            fn visit_type_insn(
                &mut self,
                opcode: Opcode,
                typ: &RefType<BinaryName>,
            ) -> Result<(), Error> {
                (**self).visit_type_insn(opcode, typ)
            }

            fn visit_field_insn(
                &mut self,
                opcode: Opcode,
                owner: &BinaryName,
                name: &UnqualifiedName,
                descriptor: &FieldType<BinaryName>,
            ) -> Result<(), Error> {
                (**self).visit_field_insn(opcode, owner, name, descriptor)
            }

            fn visit_method_insn(
                &mut self,
                opcode: Opcode,
                owner: &RefType<BinaryName>,
                name: &UnqualifiedName,
                descriptor: &MethodDescriptor<BinaryName>,
                is_interface: bool,
            ) -> Result<(), Error> {
                (**self).visit_method_insn(opcode, owner, name, descriptor, is_interface)
            }

            fn visit_invoke_dynamic_insn(
                &mut self,
                name: &UnqualifiedName,
                descriptor: &MethodDescriptor<BinaryName>,
                bootstrap_method: &Handle,
                bootstrap_arguments: &[Constant],
            ) -> Result<(), Error> {
                (**self).visit_invoke_dynamic_insn(
                    name,
                    descriptor,
                    bootstrap_method,
                    bootstrap_arguments,
                )
            }

            fn visit_jump_insn(&mut self, opcode: Opcode, label: Label) -> Result<(), Error> {
                (**self).visit_jump_insn(opcode, label)
            }

            fn visit_label(&mut self, label: Label) -> Result<(), Error> {
                (**self).visit_label(label)
            }

            fn visit_ldc_insn(&mut self, constant: &Constant) -> Result<(), Error> {
                (**self).visit_ldc_insn(constant)
            }

            fn visit_iinc_insn(&mut self, var: u16, increment: i16) -> Result<(), Error> {
                (**self).visit_iinc_insn(var, increment)
            }

            fn visit_table_switch_insn(
                &mut self,
                low: i32,
                high: i32,
                default: Label,
                targets: &[Label],
            ) -> Result<(), Error> {
                (**self).visit_table_switch_insn(low, high, default, targets)
            }

            fn visit_lookup_switch_insn(
                &mut self,
                default: Label,
                keys: &[i32],
                targets: &[Label],
            ) -> Result<(), Error> {
                (**self).visit_lookup_switch_insn(default, keys, targets)
            }

            fn visit_multi_a_new_array_insn(
                &mut self,
                typ: &RefType<BinaryName>,
                dimensions: u8,
            ) -> Result<(), Error> {
                (**self).visit_multi_a_new_array_insn(typ, dimensions)
            }

            fn visit_try_catch_block(
                &mut self,
                start: Label,
                end: Label,
                handler: Label,
                catch_type: Option<&BinaryName>,
            ) -> Result<(), Error> {
                (**self).visit_try_catch_block(start, end, handler, catch_type)
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
                (**self).visit_local_variable(name, descriptor, signature, start, end, index)
            }

            fn visit_line_number(&mut self, line: u16, start: Label) -> Result<(), Error> {
                (**self).visit_line_number(line, start)
            }

            fn visit_maxs(&mut self, max_stack: u16, max_locals: u16) -> Result<(), Error> {
                (**self).visit_maxs(max_stack, max_locals)
            }

            fn visit_end(&mut self) -> Result<(), Error> {
                (**self).visit_end()
            }
        }
    };
}

forward_method_visitor!(impl<V: MethodVisitor + ?Sized> MethodVisitor for Box<V>);
forward_method_visitor!(impl<'a, V: MethodVisitor + ?Sized> MethodVisitor for &'a mut V);

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{ConstantDynamic, HandleKind, MemberDescriptor, Name};

    /// Terminal visitor that counts the events it receives
    #[derive(Default)]
    struct Counter {
        insns: usize,
        ends: usize,
    }

    impl MethodVisitor for Counter {
        fn visit_insn(&mut self, _opcode: Opcode) -> Result<(), Error> {
            self.insns += 1;
            Ok(())
        }

        fn visit_end(&mut self) -> Result<(), Error> {
            self.ends += 1;
            Ok(())
        }
    }

    /// Pass-through stage with a declared API version
    struct PassThrough<V> {
        api: ApiVersion,
        next: V,
    }

    impl<V: MethodVisitor> MethodVisitor for PassThrough<V> {
        fn api(&self) -> ApiVersion {
            self.api
        }

        fn delegate(&mut self) -> Option<&mut dyn MethodVisitor> {
            Some(&mut self.next)
        }
    }

    fn handle() -> Handle {
        Handle {
            kind: HandleKind::InvokeStatic,
            owner: BinaryName::from_str("me/Bootstrap").unwrap(),
            name: UnqualifiedName::from_str("bsm").unwrap(),
            descriptor: MemberDescriptor::Method(MethodDescriptor {
                parameters: vec![],
                return_type: None,
            }),
            is_interface: false,
        }
    }

    #[test]
    fn default_bodies_forward() {
        let mut stage = PassThrough {
            api: ApiVersion::LATEST,
            next: Counter::default(),
        };
        stage.visit_code().unwrap();
        stage.visit_insn(Opcode::Nop).unwrap();
        stage.visit_insn(Opcode::Return).unwrap();
        stage.visit_end().unwrap();
        assert_eq!(stage.next.insns, 2);
        assert_eq!(stage.next.ends, 1);
    }

    #[test]
    fn boxed_and_borrowed_visitors_forward() {
        let mut counter = Counter::default();
        {
            let mut boxed: Box<dyn MethodVisitor + '_> = Box::new(&mut counter);
            boxed.visit_insn(Opcode::Nop).unwrap();
        }
        assert_eq!(counter.insns, 1);
    }

    #[test]
    fn api_gates_constants() {
        let mut old = PassThrough {
            api: ApiVersion::V4,
            next: Counter::default(),
        };
        assert!(old.visit_ldc_insn(&Constant::Integer(1)).is_ok());
        assert!(matches!(
            old.visit_ldc_insn(&Constant::MethodHandle(handle())),
            Err(Error::UnsupportedByApi {
                required: ApiVersion::V5,
                declared: ApiVersion::V4,
                ..
            })
        ));

        let mut v5 = PassThrough {
            api: ApiVersion::V5,
            next: Counter::default(),
        };
        let dynamic = Constant::Dynamic(Box::new(ConstantDynamic {
            name: UnqualifiedName::from_str("x").unwrap(),
            descriptor: FieldType::int(),
            bootstrap_method: handle(),
            bootstrap_arguments: vec![],
        }));
        assert!(v5.visit_ldc_insn(&Constant::MethodHandle(handle())).is_ok());
        assert!(matches!(
            v5.visit_ldc_insn(&dynamic),
            Err(Error::UnsupportedByApi {
                required: ApiVersion::V7,
                ..
            })
        ));
    }

    #[test]
    fn api_gates_invoke_dynamic() {
        let mut old = PassThrough {
            api: ApiVersion::V4,
            next: Counter::default(),
        };
        let descriptor = MethodDescriptor {
            parameters: vec![],
            return_type: None,
        };
        let name = UnqualifiedName::from_str("run").unwrap();
        assert!(old
            .visit_invoke_dynamic_insn(&name, &descriptor, &handle(), &[])
            .is_err());
    }
}
