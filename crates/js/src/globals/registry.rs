//! The table of predefined globals.
//!
//! The table is written as a tree of [`Def`]s and flattened into an arena of
//! [`Entity`] records once per process. Entries may point at other entries
//! by path (`Infinity` is `Number.POSITIVE_INFINITY`, `window` is the root),
//! which is resolved in a second pass after every entry has an id.

use std::collections::BTreeMap;

use lazy_static::lazy_static;

use crate::value::Literal;

use super::Hook;

/// Handle to an [`Entity`] in the [`Registry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u16);

/// One predefined global or member of one
#[derive(Debug, Clone, Default)]
pub struct Entity {
    pub name: &'static str,
    pub literal: Option<Literal>,
    pub members: BTreeMap<&'static str, EntityId>,
    pub type_of: Option<&'static str>,
    pub readonly: bool,
    pub undefined: bool,
    /// Feature tag logged whenever the entity is touched or called
    pub feature: Option<&'static str>,
    /// Runs whenever the entity is materialised
    pub on_value: Option<Hook>,
    /// Runs when the entity is called
    pub on_return: Option<Hook>,
    /// Runs when the entity is constructed with `new`
    pub on_new: Option<Hook>,
}

impl Entity {
    pub fn has_members(&self) -> bool {
        !self.members.is_empty()
    }
}

#[derive(Debug)]
pub struct Registry {
    entities: Vec<Entity>,
    root: EntityId,
}

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::build(window());
}

impl Registry {
    pub fn global() -> &'static Registry {
        &REGISTRY
    }

    pub fn root(&self) -> EntityId {
        self.root
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0 as usize]
    }

    pub fn member(&self, parent: EntityId, name: &str) -> Option<EntityId> {
        self.entity(parent).members.get(name).copied()
    }

    /// A name visible in the global scope.
    pub fn lookup(&self, name: &str) -> Option<EntityId> {
        self.member(self.root, name)
    }

    /// Walks `path` from the root.
    pub fn resolve(&self, path: &[&str]) -> Option<EntityId> {
        path.iter().try_fold(self.root, |id, name| self.member(id, name))
    }

    fn build(root: Def) -> Self {
        let mut registry = Registry { entities: Vec::new(), root: EntityId(0) };
        let mut aliases = Vec::new();
        let Def::Entity(spec) = root else {
            return registry;
        };
        registry.root = registry.insert("window", spec, &mut aliases);

        for (parent, name, path) in aliases {
            match registry.resolve(path) {
                Some(target) => {
                    registry.entities[parent.0 as usize].members.insert(name, target);
                }
                None => log::warn!("Unresolved global alias {} -> {:?}", name, path),
            }
        }
        registry
    }

    fn insert(
        &mut self,
        name: &'static str,
        spec: EntitySpec,
        aliases: &mut Vec<(EntityId, &'static str, &'static [&'static str])>,
    ) -> EntityId {
        let id = EntityId(self.entities.len() as u16);
        self.entities.push(Entity {
            name,
            literal: spec.literal,
            members: BTreeMap::new(),
            type_of: spec.type_of,
            readonly: spec.readonly,
            undefined: spec.undefined,
            feature: spec.feature,
            on_value: spec.on_value,
            on_return: spec.on_return,
            on_new: spec.on_new,
        });

        for (member, def) in spec.members {
            match def {
                Def::Alias(path) => aliases.push((id, member, path)),
                Def::Entity(child) => {
                    let child_id = self.insert(member, child, aliases);
                    self.entities[id.0 as usize].members.insert(member, child_id);
                }
            }
        }
        id
    }
}

enum Def {
    Entity(EntitySpec),
    Alias(&'static [&'static str]),
}

#[derive(Default)]
struct EntitySpec {
    literal: Option<Literal>,
    members: Vec<(&'static str, Def)>,
    type_of: Option<&'static str>,
    readonly: bool,
    undefined: bool,
    feature: Option<&'static str>,
    on_value: Option<Hook>,
    on_return: Option<Hook>,
    on_new: Option<Hook>,
}

impl EntitySpec {
    fn member(mut self, name: &'static str, def: Def) -> Self {
        self.members.push((name, def));
        self
    }

    fn members(mut self, names: &[&'static str], make: impl Fn() -> Def) -> Self {
        for name in names {
            self.members.push((*name, make()));
        }
        self
    }

    fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    fn literal(mut self, literal: Literal) -> Self {
        self.literal = Some(literal);
        self
    }

    fn returns(mut self, hook: Hook) -> Self {
        self.on_return = Some(hook);
        self
    }

    fn done(self) -> Def {
        Def::Entity(self)
    }
}

fn ent() -> EntitySpec {
    EntitySpec::default()
}

fn empty() -> Def {
    ent().done()
}

fn mutable() -> Def {
    empty()
}

fn readonly() -> Def {
    ent().readonly().done()
}

fn constant(value: f64) -> Def {
    ent().literal(Literal::Number(value)).done()
}

fn feature(tag: &'static str) -> Def {
    feature_with(tag, ent())
}

fn feature_with(tag: &'static str, spec: EntitySpec) -> Def {
    EntitySpec { feature: Some(tag), ..spec }.done()
}

fn returning(hook: Hook) -> Def {
    ent().returns(hook).done()
}

/// `prototype` and `constructor` shared by the builtin constructors
fn constructor() -> EntitySpec {
    ent().member("prototype", readonly()).member("constructor", Def::Alias(&["Function"]))
}

fn csp_script() -> Def {
    EntitySpec {
        on_value: Some(Hook::CspScript),
        on_return: Some(Hook::CspScript),
        on_new: Some(Hook::CspScript),
        ..ent()
    }
    .done()
}

fn window() -> Def {
    use super::MathFn;

    let fullscreen = ["cancelFullScreen", "mozCancelFullScreen", "webkitCancelFullScreen",
        "fullScreenElement", "mozFullScreenElement", "webkitFullScreenElement"];
    let document = ent()
        .member("title", mutable())
        .member("defaultView", Def::Alias(&[]))
        .member("createElement", empty())
        .member("createElementNS", empty())
        .members(&fullscreen, || feature("FULLSCREEN"));

    let apps = || feature_with("APPS", ent().member("installPackage", feature("PACKAGED_APPS")));
    let user_media = || returning(Hook::GetUserMedia);
    let navigator = ent()
        .member("apps", apps())
        .member("mozApps", apps())
        .members(&["pay", "mozPay"], || feature("PAY"))
        .member("battery", feature("BATTERY"))
        .members(&["bluetooth", "mozBluetooth"], || feature("BLUETOOTH"))
        .members(&["contacts", "mozContacts"], || feature("CONTACTS"))
        .member("getDeviceStorage", feature("DEVICE_STORAGE"))
        .members(&["geolocation", "getCurrentPosition"], || feature("GEOLOCATION"))
        .members(&["addIdleObserver", "removeIdleObserver"], || feature("IDLE"))
        .members(&["connection", "mozConnection"], || feature("NETWORK_INFO"))
        .members(&["networkStats", "mozNetworkStats"], || feature("NETWORK_STATS"))
        .members(&["push", "mozPush"], || feature("PUSH"))
        .members(&["time", "mozTime"], || feature("TIME_CLOCK"))
        .member("vibrate", feature("VIBRATE"))
        .members(&["FM", "mozFM", "mozFMRadio"], || feature("FM"))
        .members(&["SMS", "mozSMS", "mozSms"], || feature("SMS"))
        .members(&["getGamepad", "mozGetGamepad", "webkitGetGamepad"], || feature("GAMEPAD"))
        .members(&["getUserMedia", "mozGetUserMedia", "webkitGetUserMedia"], user_media);

    let number = constructor()
        .member("POSITIVE_INFINITY", constant(f64::INFINITY))
        .member("NEGATIVE_INFINITY", constant(f64::NEG_INFINITY))
        .returns(Hook::NumberCtor);

    let math_fn = |f: MathFn| returning(Hook::Math(f));
    let math_object = ent()
        .member("PI", constant(std::f64::consts::PI))
        .member("E", constant(std::f64::consts::E))
        .member("LN2", constant(std::f64::consts::LN_2))
        .member("LN10", constant(std::f64::consts::LN_10))
        .member("LOG2E", constant(std::f64::consts::LOG2_E))
        .member("LOG10E", constant(std::f64::consts::LOG10_E))
        .member("SQRT2", constant(std::f64::consts::SQRT_2))
        .member("SQRT1_2", constant(std::f64::consts::FRAC_1_SQRT_2))
        .member("abs", math_fn(MathFn::Abs))
        .member("acos", math_fn(MathFn::Acos))
        .member("asin", math_fn(MathFn::Asin))
        .member("atan", math_fn(MathFn::Atan))
        .member("atan2", math_fn(MathFn::Atan2))
        .member("ceil", math_fn(MathFn::Ceil))
        .member("cos", math_fn(MathFn::Cos))
        .member("exp", math_fn(MathFn::Exp))
        .member("floor", math_fn(MathFn::Floor))
        .member("log", returning(Hook::MathLog))
        .member("max", math_fn(MathFn::Max))
        .member("min", math_fn(MathFn::Min))
        .member("pow", math_fn(MathFn::Pow))
        .member("random", returning(Hook::MathRandom))
        .member("round", returning(Hook::MathRound))
        .member("sin", math_fn(MathFn::Sin))
        .member("sqrt", math_fn(MathFn::Sqrt))
        .member("tan", math_fn(MathFn::Tan));

    let xhr = EntitySpec { on_new: Some(Hook::XhrNew), ..ent() }
        .member("open", ent().returns(Hook::XhrOpen).done());

    ent()
        .member("window", Def::Alias(&[]))
        .member("opener", Def::Alias(&[]))
        .member("null", ent().literal(Literal::Null).done())
        .member("document", document.done())
        .member("setTimeout", returning(Hook::Timer))
        .member("setInterval", returning(Hook::Timer))
        .members(
            &["encodeURI", "decodeURI", "encodeURIComponent", "decodeURIComponent", "escape",
                "unescape", "isFinite", "isNaN", "parseFloat", "parseInt"],
            readonly,
        )
        .member("eval", csp_script())
        .member("Function", csp_script())
        .member("Object", constructor().done())
        .member("String", constructor().returns(Hook::StringCtor).done())
        .member("Array", constructor().returns(Hook::ArrayCtor).done())
        .member("Number", number.done())
        .member("Boolean", constructor().returns(Hook::BooleanCtor).done())
        .members(&["RegExp", "Date", "File"], || constructor().done())
        .member("Math", math_object.done())
        .member("XMLHttpRequest", xhr.done())
        .member("Infinity", Def::Alias(&["Number", "POSITIVE_INFINITY"]))
        .member(
            "NaN",
            EntitySpec { type_of: Some("number"), ..ent() }
                .readonly()
                .literal(Literal::Number(f64::NAN))
                .done(),
        )
        .member(
            "undefined",
            EntitySpec { undefined: true, ..ent() }.readonly().literal(Literal::Undefined).done(),
        )
        .members(&["innerHeight", "innerWidth", "width", "height"], mutable)
        .member("navigator", navigator.done())
        .members(&["Activity", "MozActivity"], || feature("ACTIVITY"))
        .member("ondevicelight", feature("LIGHT_EVENTS"))
        .member("ArchiveReader", feature("ARCHIVE"))
        .members(&["indexedDB", "mozIndexedDB"], || feature("INDEXEDDB"))
        .member("ondeviceproximity", feature("PROXIMITY"))
        .member("ondeviceorientation", feature("ORIENTATION"))
        .member("ontouchstart", feature("TOUCH"))
        .member("Audio", feature("AUDIO"))
        .members(&["webkitAudioContext", "mozAudioContext", "AudioContext"], || feature("WEBAUDIO"))
        .members(
            &["persistentStorage", "mozPersistentStorage", "webkitPersistentStorage", "StorageInfo"],
            || feature("QUOTA"),
        )
        .member("fullScreen", feature("FULLSCREEN"))
        .done()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_the_root() {
        let registry = Registry::global();
        let root = registry.root();
        assert_eq!(registry.lookup("window"), Some(root));
        assert_eq!(registry.resolve(&["window", "opener", "document", "defaultView"]), Some(root));
    }

    #[test]
    fn test_aliases_resolve() {
        let registry = Registry::global();
        let infinity = registry.lookup("Infinity").unwrap();
        assert_eq!(registry.resolve(&["Number", "POSITIVE_INFINITY"]), Some(infinity));
        assert_eq!(registry.entity(infinity).literal, Some(Literal::Number(f64::INFINITY)));

        let function = registry.lookup("Function").unwrap();
        assert_eq!(registry.resolve(&["String", "constructor"]), Some(function));
    }

    #[test]
    fn test_feature_entries() {
        let registry = Registry::global();
        let vibrate = registry.resolve(&["navigator", "vibrate"]).unwrap();
        assert_eq!(registry.entity(vibrate).feature, Some("VIBRATE"));

        let install = registry.resolve(&["navigator", "mozApps", "installPackage"]).unwrap();
        assert_eq!(registry.entity(install).feature, Some("PACKAGED_APPS"));
    }

    #[test]
    fn test_special_values() {
        let registry = Registry::global();
        let undefined = registry.entity(registry.lookup("undefined").unwrap());
        assert!(undefined.undefined && undefined.readonly);
        assert_eq!(undefined.literal, Some(Literal::Undefined));

        let nan = registry.entity(registry.lookup("NaN").unwrap());
        assert_eq!(nan.type_of, Some("number"));
        assert!(registry.lookup("parseInt").map(|id| registry.entity(id).readonly).unwrap());
        assert!(registry.lookup("unknownThing").is_none());
    }
}
