//! Static registry of built-in library objects
//!
//! Lists every object the interpreter knows about together with its members,
//! their kind and arity. The parser validates calls and field accesses against
//! it, and the dispatcher uses the canonical spellings it returns.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// What a member of a library object is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberKind {
    Method { arity: usize },
    Field { read_only: bool },
    Event,
}

#[derive(Clone, Debug)]
pub struct MemberInfo {
    /// Canonical capitalization
    pub name: &'static str,
    pub kind: MemberKind,
}

#[derive(Clone, Debug)]
pub struct ObjectInfo {
    /// Canonical capitalization
    pub name: &'static str,
    members: HashMap<String, MemberInfo>,
}

impl ObjectInfo {
    pub fn member(&self, name: &str) -> Option<&MemberInfo> {
        self.members.get(&name.to_ascii_lowercase())
    }
}

/// Case-insensitive lookup table of objects
#[derive(Debug)]
pub struct Registry {
    objects: HashMap<String, ObjectInfo>,
}

impl Registry {
    pub fn object(&self, name: &str) -> Option<&ObjectInfo> {
        self.objects.get(&name.to_ascii_lowercase())
    }

    /// Look up `object.member`, returning both entries
    pub fn member(&self, object: &str, member: &str) -> Option<(&ObjectInfo, &MemberInfo)> {
        let obj = self.object(object)?;
        obj.member(member).map(|m| (obj, m))
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectInfo> {
        self.objects.values()
    }
}

use MemberKind::{Event, Field, Method};

const fn m(arity: usize) -> MemberKind {
    Method { arity }
}

const RW: MemberKind = Field { read_only: false };
const RO: MemberKind = Field { read_only: true };

const TEXT_WINDOW: &[(&str, MemberKind)] = &[
    ("Write", m(1)),
    ("WriteLine", m(1)),
    ("Read", m(0)),
    ("ReadNumber", m(0)),
    ("Pause", m(0)),
    ("PauseWithoutMessage", m(0)),
    ("PauseIfVisible", m(0)),
    ("Clear", m(0)),
    ("Show", m(0)),
    ("Hide", m(0)),
    ("ForegroundColor", RW),
    ("BackgroundColor", RW),
    ("Title", RW),
    ("CursorLeft", RW),
    ("CursorTop", RW),
];

const MATH: &[(&str, MemberKind)] = &[
    ("Abs", m(1)),
    ("ArcCos", m(1)),
    ("ArcSin", m(1)),
    ("ArcTan", m(1)),
    ("Ceiling", m(1)),
    ("Cos", m(1)),
    ("Floor", m(1)),
    ("GetDegrees", m(1)),
    ("GetRadians", m(1)),
    ("GetRandomNumber", m(1)),
    ("Log", m(1)),
    ("NaturalLog", m(1)),
    ("Round", m(1)),
    ("Sin", m(1)),
    ("SquareRoot", m(1)),
    ("Tan", m(1)),
    ("Max", m(2)),
    ("Min", m(2)),
    ("Power", m(2)),
    ("Remainder", m(2)),
    ("Pi", RO),
];

const TEXT: &[(&str, MemberKind)] = &[
    ("Append", m(2)),
    ("ConvertToLowerCase", m(1)),
    ("ConvertToUpperCase", m(1)),
    ("EndsWith", m(2)),
    ("StartsWith", m(2)),
    ("GetCharacter", m(1)),
    ("GetCharacterCode", m(1)),
    ("GetIndexOf", m(2)),
    ("GetLength", m(1)),
    ("GetSubText", m(3)),
    ("GetSubTextToEnd", m(2)),
    ("IsSubText", m(2)),
];

const ARRAY: &[(&str, MemberKind)] = &[
    ("ContainsIndex", m(2)),
    ("ContainsValue", m(2)),
    ("GetAllIndices", m(1)),
    ("GetItemCount", m(1)),
    ("IsArray", m(1)),
    ("SetValue", m(3)),
    ("GetValue", m(2)),
    ("RemoveValue", m(2)),
];

const STACK: &[(&str, MemberKind)] = &[
    ("PushValue", m(2)),
    ("PopValue", m(1)),
    ("GetCount", m(1)),
];

const PROGRAM: &[(&str, MemberKind)] = &[
    ("ArgumentCount", RO),
    ("Directory", RO),
    ("GetArgument", m(1)),
    ("Delay", m(1)),
    ("End", m(0)),
];

const CLOCK: &[(&str, MemberKind)] = &[
    ("Date", RO),
    ("Time", RO),
    ("Year", RO),
    ("Month", RO),
    ("Day", RO),
    ("WeekDay", RO),
    ("Hour", RO),
    ("Minute", RO),
    ("Second", RO),
    ("Millisecond", RO),
    ("ElapsedMilliseconds", RO),
];

const TIMER: &[(&str, MemberKind)] = &[
    ("Interval", RW),
    ("Pause", m(0)),
    ("Resume", m(0)),
    ("Tick", Event),
];

/// The process-wide registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let tables: [(&'static str, &[(&'static str, MemberKind)]); 8] = [
        ("TextWindow", TEXT_WINDOW),
        ("Math", MATH),
        ("Text", TEXT),
        ("Array", ARRAY),
        ("Stack", STACK),
        ("Program", PROGRAM),
        ("Clock", CLOCK),
        ("Timer", TIMER),
    ];

    let objects = tables
        .iter()
        .map(|(name, members)| {
            let members = members
                .iter()
                .map(|(member, kind)| {
                    (
                        member.to_ascii_lowercase(),
                        MemberInfo {
                            name: *member,
                            kind: *kind,
                        },
                    )
                })
                .collect();
            (
                name.to_ascii_lowercase(),
                ObjectInfo {
                    name: *name,
                    members,
                },
            )
        })
        .collect();

    Registry { objects }
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let (obj, member) = REGISTRY.member("textwindow", "WRITELINE").unwrap();
        assert_eq!(obj.name, "TextWindow");
        assert_eq!(member.name, "WriteLine");
        assert_eq!(member.kind, MemberKind::Method { arity: 1 });
    }

    #[test]
    fn test_unknown_names() {
        assert!(REGISTRY.object("GraphicsWindow").is_none());
        assert!(REGISTRY.member("Math", "Cube").is_none());
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            REGISTRY.member("Math", "Pi").unwrap().1.kind,
            MemberKind::Field { read_only: true }
        );
        assert_eq!(REGISTRY.member("Timer", "Tick").unwrap().1.kind, MemberKind::Event);
        assert_eq!(REGISTRY.objects().count(), 8);
    }
}
