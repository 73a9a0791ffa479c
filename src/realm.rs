//! Realm: a heap plus the installed built-ins.
//!
//! Built-in modules describe themselves through [`PropertyInstaller`]; the
//! realm is the installer. Each intrinsic has a prototype table (instance
//! methods, getters, the descriptive tag) and a constructor table (static
//! methods). Method dispatch on a receiver goes through the prototype of its
//! kind, so redefining a prototype method changes what every instance, and
//! every constructor drain, calls.

use crate::array_buffer;
use crate::construct;
use crate::error::{Error, Result};
use crate::heap::{Heap, HeapConfig, Kind};
use crate::value::Value;
use crate::weak_collection;
use bitflags::bitflags;
use hashbrown::HashMap;
use std::rc::Rc;

/// Property key of the descriptive tag string.
pub const TO_STRING_TAG: &str = "@@toStringTag";

/// A built-in method: `(heap, receiver, arguments) -> result`.
pub type NativeFn = Rc<dyn Fn(&Heap, &Value, &[Value]) -> Result<Value>>;

/// Wrap a closure as a [`NativeFn`].
pub fn native<F>(f: F) -> NativeFn
where
    F: Fn(&Heap, &Value, &[Value]) -> Result<Value> + 'static,
{
    Rc::new(f)
}

/// Argument `i`, or `undefined` when not supplied.
pub(crate) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct Attributes: u8 {
        const DONT_ENUM = 1;
        const READ_ONLY = 1 << 1;
    }
}

#[derive(Clone)]
pub enum Property {
    Method(NativeFn),
    Getter(NativeFn),
    Data(Value),
}

impl core::fmt::Debug for Property {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Property::Method(_) => f.write_str("Method(..)"),
            Property::Getter(_) => f.write_str("Getter(..)"),
            Property::Data(v) => f.debug_tuple("Data").field(v).finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PropertySlot {
    pub property: Property,
    pub attributes: Attributes,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Intrinsic {
    WeakMap,
    WeakSet,
    ArrayBuffer,
}

impl Intrinsic {
    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::WeakMap => "WeakMap",
            Intrinsic::WeakSet => "WeakSet",
            Intrinsic::ArrayBuffer => "ArrayBuffer",
        }
    }

    /// Intrinsic whose prototype serves objects of `kind`.
    pub fn for_kind(kind: Kind) -> Option<Self> {
        match kind {
            Kind::WeakMap => Some(Intrinsic::WeakMap),
            Kind::WeakSet => Some(Intrinsic::WeakSet),
            Kind::ArrayBuffer => Some(Intrinsic::ArrayBuffer),
            Kind::Ordinary | Kind::Array | Kind::View => None,
        }
    }
}

/// Where an installed property lands.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Target {
    Prototype(Intrinsic),
    Constructor(Intrinsic),
}

/// How a constructor was invoked.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Invocation {
    Construct,
    Call,
}

impl Invocation {
    pub fn require_construct(self, constructor: &'static str) -> Result<()> {
        match self {
            Invocation::Construct => Ok(()),
            Invocation::Call => Err(Error::ConstructorMisuse { constructor }),
        }
    }
}

/// Attaches named properties to prototypes and constructors at start-up.
pub trait PropertyInstaller {
    fn add_named_property(
        &mut self,
        target: Target,
        name: &'static str,
        value: Value,
        attributes: Attributes,
    );

    fn install_getter(&mut self, target: Target, name: &'static str, getter: NativeFn);

    fn install_functions(
        &mut self,
        target: Target,
        attributes: Attributes,
        functions: Vec<(&'static str, NativeFn)>,
    );
}

pub struct Realm {
    heap: Heap,
    tables: HashMap<Target, HashMap<&'static str, PropertySlot>>,
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyInstaller for Realm {
    fn add_named_property(
        &mut self,
        target: Target,
        name: &'static str,
        value: Value,
        attributes: Attributes,
    ) {
        self.define_property(target, name, Property::Data(value), attributes);
    }

    fn install_getter(&mut self, target: Target, name: &'static str, getter: NativeFn) {
        self.define_property(target, name, Property::Getter(getter), Attributes::DONT_ENUM);
    }

    fn install_functions(
        &mut self,
        target: Target,
        attributes: Attributes,
        functions: Vec<(&'static str, NativeFn)>,
    ) {
        for (name, f) in functions {
            self.define_property(target, name, Property::Method(f), attributes);
        }
    }
}

impl Realm {
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    pub fn with_config(config: HeapConfig) -> Self {
        let mut realm = Self {
            heap: Heap::with_config(config),
            tables: HashMap::new(),
        };
        weak_collection::install(&mut realm);
        array_buffer::install(&mut realm);
        realm
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Define or replace a property.
    pub fn define_property(
        &mut self,
        target: Target,
        name: &'static str,
        property: Property,
        attributes: Attributes,
    ) {
        self.tables.entry(target).or_default().insert(
            name,
            PropertySlot {
                property,
                attributes,
            },
        );
    }

    /// Remove a property. Returns true if it existed.
    pub fn delete_property(&mut self, target: Target, name: &str) -> bool {
        self.tables
            .get_mut(&target)
            .and_then(|t| t.remove(name))
            .is_some()
    }

    pub fn lookup(&self, target: Target, name: &str) -> Option<&PropertySlot> {
        self.tables.get(&target)?.get(name)
    }

    /// Names of the enumerable properties of `target`.
    pub fn enumerable_keys(&self, target: Target) -> Vec<&'static str> {
        let mut keys: Vec<_> = self
            .tables
            .get(&target)
            .into_iter()
            .flatten()
            .filter(|(_, slot)| !slot.attributes.contains(Attributes::DONT_ENUM))
            .map(|(name, _)| *name)
            .collect();
        keys.sort_unstable();
        keys
    }

    fn prototype_of(&self, this: &Value) -> Option<Target> {
        let kind = self.heap.kind(this)?;
        Intrinsic::for_kind(kind).map(Target::Prototype)
    }

    /// The method `name` currently bound for `this`, or NotCallable.
    pub(crate) fn bound_method(&self, this: &Value, name: &str) -> Result<NativeFn> {
        let slot = self.prototype_of(this).and_then(|t| self.lookup(t, name));
        match slot {
            Some(PropertySlot {
                property: Property::Method(f),
                ..
            }) => Ok(f.clone()),
            _ => Err(Error::NotCallable {
                property: name.to_string(),
                receiver: self.heap.describe(this),
            }),
        }
    }

    /// Invoke a constructor.
    pub fn construct(
        &self,
        intrinsic: Intrinsic,
        invocation: Invocation,
        args: &[Value],
    ) -> Result<Value> {
        let first = arg(args, 0);
        match intrinsic {
            Intrinsic::WeakMap => construct::weak_map(self, invocation, &first),
            Intrinsic::WeakSet => construct::weak_set(self, invocation, &first),
            Intrinsic::ArrayBuffer => array_buffer::construct(&self.heap, invocation, &first),
        }
    }

    /// `this.name(...args)`, dispatched through the receiver's prototype.
    pub fn call_method(&self, this: &Value, name: &str, args: &[Value]) -> Result<Value> {
        let f = self.bound_method(this, name)?;
        f(&self.heap, this, args)
    }

    /// `Intrinsic.prototype.name.call(this, ...args)`.
    pub fn apply(
        &self,
        intrinsic: Intrinsic,
        name: &str,
        this: &Value,
        args: &[Value],
    ) -> Result<Value> {
        match self.lookup(Target::Prototype(intrinsic), name) {
            Some(PropertySlot {
                property: Property::Method(f) | Property::Getter(f),
                ..
            }) => f(&self.heap, this, args),
            _ => Err(Error::NotCallable {
                property: name.to_string(),
                receiver: format!("{}.prototype", intrinsic.name()),
            }),
        }
    }

    /// `Intrinsic.name(...args)`.
    pub fn call_static(&self, intrinsic: Intrinsic, name: &str, args: &[Value]) -> Result<Value> {
        match self.lookup(Target::Constructor(intrinsic), name) {
            Some(PropertySlot {
                property: Property::Method(f),
                ..
            }) => f(&self.heap, &Value::Undefined, args),
            _ => Err(Error::NotCallable {
                property: name.to_string(),
                receiver: intrinsic.name().to_string(),
            }),
        }
    }

    /// Read a data property or run a getter on `this`. Methods and missing
    /// properties read as `None`; methods are not first-class values here.
    pub fn get_property(&self, this: &Value, name: &str) -> Result<Option<Value>> {
        let Some(slot) = self.prototype_of(this).and_then(|t| self.lookup(t, name)) else {
            return Ok(None);
        };
        match &slot.property {
            Property::Data(v) => Ok(Some(v.clone())),
            Property::Getter(f) => f(&self.heap, this, &[]).map(Some),
            Property::Method(_) => Ok(None),
        }
    }

    /// The descriptive tag of `v`'s prototype, e.g. "WeakMap".
    pub fn to_string_tag(&self, v: &Value) -> Option<Rc<str>> {
        match self.get_property(v, TO_STRING_TAG) {
            Ok(Some(Value::String(s))) => Some(s),
            _ => None,
        }
    }
}
