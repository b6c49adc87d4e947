use backplane::testing::{MapResolver, dummy_spec, dummy_symbol};
use backplane::{
    BackendSpec, BackendSystem, DispatchContext, DispatchType, Dispatchable, Dispatched,
};
use std::sync::Arc;

// ============================================================================
// Test Value Types
// ============================================================================

/// The dispatchable API identifier shared by the test backends.
pub const API: &str = "numlib:combine";

pub type Args = Vec<Value>;
pub type Out = (String, Vec<Value>);

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(&'static str),
    /// A declared subclass of `num:Int`.
    Int3(i64),
}

impl Dispatched for Value {
    fn dispatch_type(&self) -> DispatchType {
        match self {
            Value::Int(_) => DispatchType::with_ancestors("num:Int", ["abst:Real"]),
            Value::Float(_) => DispatchType::with_ancestors("num:Float", ["abst:Real"]),
            Value::Str(_) => DispatchType::new("text:Str"),
            Value::Int3(_) => DispatchType::with_ancestors("num:Int3", ["num:Int", "abst:Real"]),
        }
        .unwrap()
    }
}

// ============================================================================
// Backend Fixtures
// ============================================================================

pub fn int_b() -> BackendSpec {
    dummy_spec("IntB", &["num:Int"], &[], &[API])
}

pub fn int_b2() -> BackendSpec {
    dummy_spec("IntB2", &["num:Int"], &[], &[API])
}

pub fn float_b() -> BackendSpec {
    dummy_spec("FloatB", &["num:Float"], &["num:Int"], &[API])
}

pub fn float_bh() -> BackendSpec {
    let mut spec = dummy_spec("FloatBH", &["num:Float", "num:Int"], &[], &[API]);
    spec.higher_priority_than = vec!["FloatB".into(), "FloatBL".into()];
    spec
}

pub fn float_bl() -> BackendSpec {
    let mut spec = dummy_spec("FloatBL", &["num:Float"], &["num:Int"], &[API]);
    spec.lower_priority_than = vec!["FloatB".into()];
    spec
}

pub fn int_sub_b() -> BackendSpec {
    dummy_spec("IntSubB", &["~num:Int"], &[], &[API])
}

pub fn real_b() -> BackendSpec {
    dummy_spec("RealB", &["@abst:Real"], &[], &[API])
}

// ============================================================================
// System and Dispatchable Helpers
// ============================================================================

pub fn system_with(default_types: &[&str], specs: Vec<BackendSpec>) -> BackendSystem {
    let mut builder =
        BackendSystem::builder("numlib").default_primary_types(default_types.iter().copied());
    for spec in specs {
        builder = builder.backend(spec);
    }
    builder.build().unwrap()
}

/// A resolver with one canned implementation per backend name, each
/// returning its backend's name plus the arguments it saw.
pub fn resolver_for(names: &[&str]) -> MapResolver<Args, Out> {
    let mut resolver = MapResolver::new();
    for name in names {
        let tag = (*name).to_string();
        resolver.insert(dummy_symbol(name, API), move |_: &DispatchContext, args| {
            (tag.clone(), args)
        });
    }
    resolver
}

pub fn fallback(_: &DispatchContext, args: Args) -> Out {
    ("default".to_string(), args)
}

pub fn dispatchable(
    system: &BackendSystem,
    resolver: Arc<MapResolver<Args, Out>>,
) -> Dispatchable<Args, Out> {
    Dispatchable::new(
        system,
        API,
        resolver,
        |args: &Args| args.iter().map(Dispatched::dispatch_type).collect(),
        fallback,
    )
}
