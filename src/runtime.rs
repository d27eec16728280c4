//! Runtime object model.
//!
//! Values live on the heap behind [`ObjectHandle`]s. A handle either owns a
//! share of its object, borrows it without keeping it alive (the form bound
//! to `self` during method calls), or is empty. The empty handle is the
//! evaluator's "no value": it is falsy and prints as `None`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{self, Write};
use std::rc::{Rc, Weak};

use thiserror::Error;

use crate::ast::Statement;

/// Name-to-handle mapping used as the global scope, method-local scopes, and
/// the field table of every class instance.
pub type Closure = HashMap<String, ObjectHandle>;

/// Host services available to the evaluator.
pub trait Context {
    /// The sink `print` statements and object printing write to.
    fn output_stream(&mut self) -> &mut dyn fmt::Write;
}

/// Context writing to a caller-supplied sink.
pub struct SimpleContext<'a> {
    output: &'a mut dyn fmt::Write,
}

impl<'a> SimpleContext<'a> {
    pub fn new(output: &'a mut dyn fmt::Write) -> Self {
        Self { output }
    }
}

impl Context for SimpleContext<'_> {
    fn output_stream(&mut self) -> &mut dyn fmt::Write {
        &mut *self.output
    }
}

/// Context collecting output in memory, for tests and embedding.
#[derive(Default)]
pub struct DummyContext {
    pub output: String,
}

impl Context for DummyContext {
    fn output_stream(&mut self) -> &mut dyn fmt::Write {
        &mut self.output
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Cannot call method '{method}' with {found} arguments")]
    UnknownMethod { method: String, found: usize },
    #[error("Object is not a class instance")]
    NotAnInstance,
    #[error("Object is not a class")]
    NotAClass,
    #[error("Cannot compare objects for equality")]
    EqualityNotSupported,
    #[error("Cannot compare objects for less")]
    OrderingNotSupported,
    #[error("Error. Division by zero")]
    DivisionByZero,
    #[error("Operation '{operation}' is not supported for the given operands")]
    UnsupportedOperation { operation: &'static str },
    #[error("Failed to write to the output stream")]
    Output(#[from] fmt::Error),
}

/// A method descriptor inside a [`Class`].
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub formal_params: Vec<String>,
    pub body: Statement,
}

impl Method {
    pub fn new(name: impl Into<String>, formal_params: Vec<String>, body: Statement) -> Self {
        Self {
            name: name.into(),
            formal_params,
            body,
        }
    }
}

/// Class descriptor: a name, the methods the class defines itself, and an
/// optional parent for single inheritance.
#[derive(Debug)]
pub struct Class {
    name: String,
    methods: Vec<Method>,
    parent: Option<Rc<Class>>,
}

impl Class {
    pub fn new(
        name: impl Into<String>,
        methods: Vec<Method>,
        parent: Option<Rc<Class>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            methods,
            parent,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves `name` along the chain child -> parent; first match wins.
    /// Methods shadow by name alone: a redefinition with a different arity
    /// fully replaces any inherited version visible through this class.
    pub fn method(&self, name: &str) -> Option<&Method> {
        if let Some(method) = self.methods.iter().find(|method| method.name == name) {
            return Some(method);
        }
        self.parent
            .as_deref()
            .and_then(|parent| parent.method(name))
    }
}

/// A class instance: its class and its own field table.
#[derive(Debug)]
pub struct ClassInstance {
    class: Rc<Class>,
    fields: Closure,
}

impl ClassInstance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: Closure::new(),
        }
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    pub fn fields(&self) -> &Closure {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Closure {
        &mut self.fields
    }
}

/// A heap-resident runtime value.
#[derive(Debug)]
pub enum Object {
    Number(i64),
    String(String),
    Bool(bool),
    Class(Rc<Class>),
    Instance(ClassInstance),
}

#[derive(Debug, Clone)]
enum HandleData {
    Owned(Rc<RefCell<Object>>),
    Shared(Weak<RefCell<Object>>),
}

/// Shared-ownership reference to a heap object, possibly empty.
#[derive(Debug, Clone, Default)]
pub struct ObjectHandle {
    data: Option<HandleData>,
}

impl ObjectHandle {
    /// The empty handle: no object at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Takes ownership of `object` on the heap.
    pub fn own(object: Object) -> Self {
        Self {
            data: Some(HandleData::Owned(Rc::new(RefCell::new(object)))),
        }
    }

    pub fn number(value: i64) -> Self {
        Self::own(Object::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::own(Object::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::own(Object::Bool(value))
    }

    pub fn class(class: Rc<Class>) -> Self {
        Self::own(Object::Class(class))
    }

    pub fn instance(class: Rc<Class>) -> Self {
        Self::own(Object::Instance(ClassInstance::new(class)))
    }

    /// A non-owning handle over the same object. This is the form bound to
    /// `self` during method calls, so that an instance reachable from its
    /// own field table can still be reclaimed.
    pub fn share(&self) -> Self {
        let data = match &self.data {
            None => None,
            Some(HandleData::Owned(object)) => Some(HandleData::Shared(Rc::downgrade(object))),
            Some(HandleData::Shared(weak)) => Some(HandleData::Shared(weak.clone())),
        };
        Self { data }
    }

    /// True when no live object sits behind this handle; a share whose
    /// referent was reclaimed counts as empty.
    pub fn is_empty(&self) -> bool {
        self.object().is_none()
    }

    fn object(&self) -> Option<Rc<RefCell<Object>>> {
        match &self.data {
            None => None,
            Some(HandleData::Owned(object)) => Some(object.clone()),
            Some(HandleData::Shared(weak)) => weak.upgrade(),
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        let object = self.object()?;
        let value = match &*object.borrow() {
            Object::Number(value) => Some(*value),
            _ => None,
        };
        value
    }

    pub fn as_string(&self) -> Option<String> {
        let object = self.object()?;
        let value = match &*object.borrow() {
            Object::String(value) => Some(value.clone()),
            _ => None,
        };
        value
    }

    pub fn as_bool(&self) -> Option<bool> {
        let object = self.object()?;
        let value = match &*object.borrow() {
            Object::Bool(value) => Some(*value),
            _ => None,
        };
        value
    }

    pub fn as_class(&self) -> Option<Rc<Class>> {
        let object = self.object()?;
        let class = match &*object.borrow() {
            Object::Class(class) => Some(class.clone()),
            _ => None,
        };
        class
    }

    pub fn is_instance(&self) -> bool {
        self.instance_class().is_some()
    }

    fn instance_class(&self) -> Option<Rc<Class>> {
        let object = self.object()?;
        let class = match &*object.borrow() {
            Object::Instance(instance) => Some(instance.class().clone()),
            _ => None,
        };
        class
    }

    /// The field bound to `name` on the instance behind this handle.
    pub fn field(&self, name: &str) -> Option<ObjectHandle> {
        let object = self.object()?;
        let field = match &*object.borrow() {
            Object::Instance(instance) => instance.fields().get(name).cloned(),
            _ => None,
        };
        field
    }

    /// Stores `value` under `name` in the instance's field table.
    pub fn set_field(&self, name: &str, value: ObjectHandle) -> Result<(), RuntimeError> {
        let object = self.object().ok_or(RuntimeError::NotAnInstance)?;
        let result = match &mut *object.borrow_mut() {
            Object::Instance(instance) => {
                instance.fields_mut().insert(name.to_string(), value);
                Ok(())
            }
            _ => Err(RuntimeError::NotAnInstance),
        };
        result
    }

    /// True when the instance behind this handle has `method` with exactly
    /// `argument_count` formal parameters, consulting the class chain.
    pub fn has_method(&self, method: &str, argument_count: usize) -> bool {
        let Some(class) = self.instance_class() else {
            return false;
        };
        class
            .method(method)
            .map(|method| method.formal_params.len() == argument_count)
            .unwrap_or(false)
    }

    /// Calls `method` on the instance behind this handle.
    ///
    /// A fresh local scope is built with `self` bound as a non-owning share
    /// and each formal parameter bound positionally to its argument; the
    /// method body executes in that scope and its result becomes the call's
    /// result.
    pub fn call_method(
        &self,
        method: &str,
        args: &[ObjectHandle],
        context: &mut dyn Context,
    ) -> Result<ObjectHandle, RuntimeError> {
        let unknown = || RuntimeError::UnknownMethod {
            method: method.to_string(),
            found: args.len(),
        };
        let class = self.instance_class().ok_or_else(unknown)?;
        let resolved = class.method(method).ok_or_else(unknown)?;
        if resolved.formal_params.len() != args.len() {
            return Err(unknown());
        }
        let mut locals = Closure::new();
        locals.insert("self".to_string(), self.share());
        for (param, arg) in resolved.formal_params.iter().zip(args) {
            locals.insert(param.clone(), arg.clone());
        }
        Ok(resolved.body.execute(&mut locals, context)?.into_value())
    }

    /// Renders this handle into `out`. The empty handle renders as `None`;
    /// an instance with a zero-argument `__str__` renders its result, any
    /// other instance renders a stable identity.
    pub fn print(
        &self,
        out: &mut dyn fmt::Write,
        context: &mut dyn Context,
    ) -> Result<(), RuntimeError> {
        enum Rendering {
            Done,
            CallStr,
            Identity(String),
        }

        let Some(object) = self.object() else {
            out.write_str("None")?;
            return Ok(());
        };
        // Primitive variants render under the borrow; a `__str__` call must
        // run after the borrow is released.
        let rendering = {
            let borrowed = object.borrow();
            match &*borrowed {
                Object::Number(value) => {
                    write!(out, "{value}")?;
                    Rendering::Done
                }
                Object::String(value) => {
                    out.write_str(value)?;
                    Rendering::Done
                }
                Object::Bool(value) => {
                    out.write_str(if *value { "True" } else { "False" })?;
                    Rendering::Done
                }
                Object::Class(class) => {
                    write!(out, "Class {}", class.name())?;
                    Rendering::Done
                }
                Object::Instance(instance) => {
                    let has_str = instance
                        .class()
                        .method("__str__")
                        .is_some_and(|method| method.formal_params.is_empty());
                    if has_str {
                        Rendering::CallStr
                    } else {
                        Rendering::Identity(format!(
                            "<{} object at {:p}>",
                            instance.class().name(),
                            Rc::as_ptr(&object)
                        ))
                    }
                }
            }
        };
        match rendering {
            Rendering::Done => Ok(()),
            Rendering::Identity(text) => {
                out.write_str(&text)?;
                Ok(())
            }
            Rendering::CallStr => {
                let rendered = self.call_method("__str__", &[], context)?;
                rendered.print(out, context)
            }
        }
    }
}

/// Truthiness: non-zero numbers, non-empty strings, and `True` are truthy;
/// everything else, including classes, instances, and the empty handle, is
/// falsy.
pub fn is_true(object: &ObjectHandle) -> bool {
    if let Some(value) = object.as_number() {
        return value != 0;
    }
    if let Some(value) = object.as_bool() {
        return value;
    }
    if let Some(value) = object.as_string() {
        return !value.is_empty();
    }
    false
}

/// Equality: two empty handles are equal, primitives compare by payload, and
/// an instance with a one-argument `__eq__` delegates to it.
pub fn equal(
    lhs: &ObjectHandle,
    rhs: &ObjectHandle,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    if lhs.is_empty() && rhs.is_empty() {
        return Ok(true);
    }
    if let (Some(l), Some(r)) = (lhs.as_number(), rhs.as_number()) {
        return Ok(l == r);
    }
    if let (Some(l), Some(r)) = (lhs.as_string(), rhs.as_string()) {
        return Ok(l == r);
    }
    if let (Some(l), Some(r)) = (lhs.as_bool(), rhs.as_bool()) {
        return Ok(l == r);
    }
    if lhs.has_method("__eq__", 1) {
        let result = lhs.call_method("__eq__", &[rhs.clone()], context)?;
        return result.as_bool().ok_or(RuntimeError::EqualityNotSupported);
    }
    Err(RuntimeError::EqualityNotSupported)
}

/// Ordering: primitives compare by payload, and an instance with a
/// one-argument `__lt__` delegates to it.
pub fn less(
    lhs: &ObjectHandle,
    rhs: &ObjectHandle,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    if let (Some(l), Some(r)) = (lhs.as_number(), rhs.as_number()) {
        return Ok(l < r);
    }
    if let (Some(l), Some(r)) = (lhs.as_string(), rhs.as_string()) {
        return Ok(l < r);
    }
    if let (Some(l), Some(r)) = (lhs.as_bool(), rhs.as_bool()) {
        return Ok(!l && r);
    }
    if lhs.has_method("__lt__", 1) {
        let result = lhs.call_method("__lt__", &[rhs.clone()], context)?;
        return result.as_bool().ok_or(RuntimeError::OrderingNotSupported);
    }
    Err(RuntimeError::OrderingNotSupported)
}

pub fn not_equal(
    lhs: &ObjectHandle,
    rhs: &ObjectHandle,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    Ok(!equal(lhs, rhs, context)?)
}

pub fn greater(
    lhs: &ObjectHandle,
    rhs: &ObjectHandle,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    Ok(!less(lhs, rhs, context)? && !equal(lhs, rhs, context)?)
}

pub fn less_or_equal(
    lhs: &ObjectHandle,
    rhs: &ObjectHandle,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    Ok(!greater(lhs, rhs, context)?)
}

pub fn greater_or_equal(
    lhs: &ObjectHandle,
    rhs: &ObjectHandle,
    context: &mut dyn Context,
) -> Result<bool, RuntimeError> {
    Ok(!less(lhs, rhs, context)?)
}
