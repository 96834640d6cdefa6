//! Uniform reflection for WGSL modules.
//!
//! A program's uniforms are the members of its `struct Uniforms`. Nested
//! structs and fixed-size arrays are flattened into GL-style names such as
//! `pointLights[1].linear`, each with its byte offset in the uniform buffer.
//!
//! Members may be `f32`, `i32`, `u32`, two to four component vectors of any of
//! those, `mat3x3<f32>`, `mat4x4<f32>` (including the `vec3f`/`vec4i`/`mat4x4f`
//! shorthands), user structs and fixed-size arrays. Other types such as `f16`
//! or non-square matrices are rejected.

use std::{collections::HashMap, sync::Arc};

use cgmath::{Matrix4, Vector2, Vector3, Vector4};

const UNIFORM_STRUCT: &str = "Uniforms";
const MAX_NESTING: usize = 16;

/// A value pushed into a named uniform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Uniform {
    Mat4(Matrix4<f32>),
    Vec2(Vector2<f32>),
    Vec3(Vector3<f32>),
    Vec4(Vector4<f32>),
    Float(f32),
    Int(i32),
}

impl Uniform {
    pub fn kind(&self) -> UniformKind {
        match self {
            Uniform::Mat4(_) => UniformKind::Mat4,
            Uniform::Vec2(_) => UniformKind::Vec2,
            Uniform::Vec3(_) => UniformKind::Vec3,
            Uniform::Vec4(_) => UniformKind::Vec4,
            Uniform::Float(_) => UniformKind::Float,
            Uniform::Int(_) => UniformKind::Int,
        }
    }
}

impl From<Matrix4<f32>> for Uniform {
    fn from(value: Matrix4<f32>) -> Self {
        Uniform::Mat4(value)
    }
}

impl From<Vector3<f32>> for Uniform {
    fn from(value: Vector3<f32>) -> Self {
        Uniform::Vec3(value)
    }
}

impl From<f32> for Uniform {
    fn from(value: f32) -> Self {
        Uniform::Float(value)
    }
}

impl From<i32> for Uniform {
    fn from(value: i32) -> Self {
        Uniform::Int(value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Int,
    /// Declared but not settable through [`Uniform`].
    UInt,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    // the remaining kinds are laid out but not settable either
    IVec2,
    IVec3,
    IVec4,
    UVec2,
    UVec3,
    UVec4,
    Mat3,
}

impl UniformKind {
    fn align(self) -> usize {
        match self {
            UniformKind::Float | UniformKind::Int | UniformKind::UInt => 4,
            UniformKind::Vec2 | UniformKind::IVec2 | UniformKind::UVec2 => 8,
            _ => 16,
        }
    }

    fn size(self) -> usize {
        match self {
            UniformKind::Float | UniformKind::Int | UniformKind::UInt => 4,
            UniformKind::Vec2 | UniformKind::IVec2 | UniformKind::UVec2 => 8,
            UniformKind::Vec3 | UniformKind::IVec3 | UniformKind::UVec3 => 12,
            UniformKind::Vec4 | UniformKind::IVec4 | UniformKind::UVec4 => 16,
            // three columns padded to vec4
            UniformKind::Mat3 => 48,
            UniformKind::Mat4 => 64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformField {
    pub name: String,
    pub kind: UniformKind,
    pub offset: usize,
}

/// Flattened uniform members of one program plus the total buffer size.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UniformLayout {
    fields: Vec<UniformField>,
    lookup: HashMap<String, usize>,
    size: usize,
}

impl UniformLayout {
    /// Reflect `struct Uniforms` from WGSL source. A module without one has an
    /// empty layout.
    pub fn reflect(wgsl: &str) -> Result<Self, String> {
        let source = strip_comments(wgsl);
        let structs = parse_structs(&source)?;
        let Some(members) = structs.get(UNIFORM_STRUCT) else {
            return Ok(Self::default());
        };
        let ty = struct_type(members, &structs, 0)?;
        let mut fields = Vec::new();
        flatten("", 0, &ty, &mut fields);
        let lookup = fields
            .iter()
            .enumerate()
            .map(|(i, field)| (field.name.clone(), i))
            .collect();
        Ok(Self {
            fields,
            lookup,
            size: round_up(16, ty.size.max(16)),
        })
    }

    pub fn field(&self, name: &str) -> Option<&UniformField> {
        self.lookup.get(name).map(|&i| &self.fields[i])
    }

    pub fn fields(&self) -> &[UniformField] {
        &self.fields
    }

    /// Buffer size in bytes, a multiple of 16.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// CPU copy of a program's uniform buffer.
#[derive(Clone, Debug)]
pub struct UniformBlock {
    layout: Arc<UniformLayout>,
    bytes: Vec<u8>,
}

impl UniformBlock {
    pub fn new(layout: Arc<UniformLayout>) -> Self {
        let bytes = vec![0; layout.size()];
        Self { layout, bytes }
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Write `value` into the member called `name`. Returns `false` when no
    /// member with that name and type exists.
    pub fn set(&mut self, name: &str, value: Uniform) -> bool {
        let Some(field) = self.layout.field(name) else {
            return false;
        };
        if field.kind != value.kind() {
            return false;
        }
        let at = field.offset;
        match value {
            Uniform::Mat4(m) => {
                let columns: [[f32; 4]; 4] = m.into();
                self.bytes[at..at + 64].copy_from_slice(bytemuck::bytes_of(&columns));
            }
            Uniform::Vec2(v) => {
                let v: [f32; 2] = v.into();
                self.bytes[at..at + 8].copy_from_slice(bytemuck::bytes_of(&v));
            }
            Uniform::Vec3(v) => {
                let v: [f32; 3] = v.into();
                self.bytes[at..at + 12].copy_from_slice(bytemuck::bytes_of(&v));
            }
            Uniform::Vec4(v) => {
                let v: [f32; 4] = v.into();
                self.bytes[at..at + 16].copy_from_slice(bytemuck::bytes_of(&v));
            }
            Uniform::Float(f) => self.bytes[at..at + 4].copy_from_slice(bytemuck::bytes_of(&f)),
            Uniform::Int(i) => self.bytes[at..at + 4].copy_from_slice(bytemuck::bytes_of(&i)),
        }
        true
    }

    pub fn get(&self, name: &str) -> Option<Uniform> {
        let field = self.layout.field(name)?;
        let at = field.offset;
        let bytes = &self.bytes[at..at + field.kind.size()];
        Some(match field.kind {
            UniformKind::Mat4 => {
                Uniform::Mat4(bytemuck::pod_read_unaligned::<[[f32; 4]; 4]>(bytes).into())
            }
            UniformKind::Vec2 => Uniform::Vec2(bytemuck::pod_read_unaligned::<[f32; 2]>(bytes).into()),
            UniformKind::Vec3 => Uniform::Vec3(bytemuck::pod_read_unaligned::<[f32; 3]>(bytes).into()),
            UniformKind::Vec4 => Uniform::Vec4(bytemuck::pod_read_unaligned::<[f32; 4]>(bytes).into()),
            UniformKind::Float => Uniform::Float(bytemuck::pod_read_unaligned(bytes)),
            UniformKind::Int => Uniform::Int(bytemuck::pod_read_unaligned(bytes)),
            _ => return None,
        })
    }
}

fn round_up(align: usize, n: usize) -> usize {
    n.div_ceil(align) * align
}

#[derive(Clone, Debug)]
struct Member {
    name: String,
    ty: String,
    align: Option<usize>,
    size: Option<usize>,
}

#[derive(Clone, Debug)]
struct Ty {
    align: usize,
    size: usize,
    shape: Shape,
}

#[derive(Clone, Debug)]
enum Shape {
    Leaf(UniformKind),
    Array { elem: Box<Ty>, count: usize, stride: usize },
    Struct(Vec<(String, usize, Ty)>),
}

impl Ty {
    /// Alignment a member of this type needs inside a uniform buffer.
    fn uniform_align(&self) -> usize {
        match self.shape {
            Shape::Leaf(_) => self.align,
            _ => round_up(16, self.align),
        }
    }
}

fn flatten(prefix: &str, base: usize, ty: &Ty, out: &mut Vec<UniformField>) {
    match &ty.shape {
        Shape::Leaf(kind) => out.push(UniformField {
            name: prefix.to_string(),
            kind: *kind,
            offset: base,
        }),
        Shape::Array {
            elem,
            count,
            stride,
        } => {
            for i in 0..*count {
                flatten(&format!("{prefix}[{i}]"), base + i * stride, elem, out);
            }
        }
        Shape::Struct(members) => {
            for (name, offset, member) in members {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                flatten(&path, base + offset, member, out);
            }
        }
    }
}

fn struct_type(members: &[Member], structs: &HashMap<String, Vec<Member>>, depth: usize) -> Result<Ty, String> {
    let mut cursor = 0;
    let mut align = 1;
    let mut laid_out = Vec::with_capacity(members.len());
    for member in members {
        let ty = parse_type(&member.ty, structs, depth + 1)?;
        let member_align = member.align.unwrap_or_else(|| ty.uniform_align());
        let member_size = member.size.unwrap_or(ty.size);
        let offset = round_up(member_align, cursor);
        cursor = offset + member_size;
        align = align.max(member_align);
        laid_out.push((member.name.clone(), offset, ty));
    }
    Ok(Ty {
        align,
        size: round_up(align, cursor),
        shape: Shape::Struct(laid_out),
    })
}

fn parse_type(ty: &str, structs: &HashMap<String, Vec<Member>>, depth: usize) -> Result<Ty, String> {
    if depth > MAX_NESTING {
        return Err(format!("type `{ty}` nests too deeply (recursive struct?)"));
    }
    let leaf = match ty {
        "f32" => Some(UniformKind::Float),
        "i32" => Some(UniformKind::Int),
        "u32" => Some(UniformKind::UInt),
        "vec2<f32>" | "vec2f" => Some(UniformKind::Vec2),
        "vec3<f32>" | "vec3f" => Some(UniformKind::Vec3),
        "vec4<f32>" | "vec4f" => Some(UniformKind::Vec4),
        "vec2<i32>" | "vec2i" => Some(UniformKind::IVec2),
        "vec3<i32>" | "vec3i" => Some(UniformKind::IVec3),
        "vec4<i32>" | "vec4i" => Some(UniformKind::IVec4),
        "vec2<u32>" | "vec2u" => Some(UniformKind::UVec2),
        "vec3<u32>" | "vec3u" => Some(UniformKind::UVec3),
        "vec4<u32>" | "vec4u" => Some(UniformKind::UVec4),
        "mat3x3<f32>" | "mat3x3f" => Some(UniformKind::Mat3),
        "mat4x4<f32>" | "mat4x4f" => Some(UniformKind::Mat4),
        _ => None,
    };
    if let Some(kind) = leaf {
        return Ok(Ty {
            align: kind.align(),
            size: kind.size(),
            shape: Shape::Leaf(kind),
        });
    }
    if let Some(inner) = ty.strip_prefix("array<").and_then(|t| t.strip_suffix('>')) {
        let split = top_level_split(inner, ',');
        let [elem, count] = split.as_slice() else {
            return Err(format!("uniform arrays need a fixed size: `{ty}`"));
        };
        let count: usize = count
            .trim()
            .trim_end_matches('u')
            .parse()
            .map_err(|_| format!("invalid array length in `{ty}`"))?;
        let elem = parse_type(elem.trim(), structs, depth + 1)?;
        let stride = round_up(elem.align, elem.size);
        return Ok(Ty {
            align: elem.align,
            size: stride * count,
            shape: Shape::Array {
                elem: Box::new(elem),
                count,
                stride,
            },
        });
    }
    match structs.get(ty) {
        Some(members) => struct_type(members, structs, depth + 1),
        None => Err(format!("unsupported uniform type `{ty}`")),
    }
}

fn strip_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    while let Some(c) = chars.next() {
        let next = chars.peek().copied();
        match (c, next) {
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                // WGSL block comments nest
                chars.next();
                let mut depth = 1;
                let mut prev = ' ';
                for c in chars.by_ref() {
                    match (prev, c) {
                        ('*', '/') => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                            prev = ' ';
                        }
                        ('/', '*') => {
                            depth += 1;
                            prev = ' ';
                        }
                        _ => prev = c,
                    }
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn parse_structs(src: &str) -> Result<HashMap<String, Vec<Member>>, String> {
    let mut structs = HashMap::new();
    let mut rest = src;
    while let Some(at) = rest.find("struct") {
        let before_ok = rest[..at].chars().next_back().is_none_or(|c| !is_ident(c));
        let after = &rest[at + "struct".len()..];
        if !before_ok || !after.starts_with(char::is_whitespace) {
            rest = after;
            continue;
        }
        let open = after
            .find('{')
            .ok_or_else(|| "struct without a body".to_string())?;
        let name = after[..open].trim().to_string();
        let close = after[open..]
            .find('}')
            .ok_or_else(|| format!("unterminated struct `{name}`"))?
            + open;
        let members = top_level_split(&after[open + 1..close], ',')
            .into_iter()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(parse_member)
            .collect::<Result<Vec<_>, _>>()?;
        structs.insert(name, members);
        rest = &after[close + 1..];
    }
    Ok(structs)
}

fn parse_member(text: &str) -> Result<Member, String> {
    let mut rest = text.trim();
    let mut align = None;
    let mut size = None;
    while let Some(attr) = rest.strip_prefix('@') {
        let name_end = attr.find(|c: char| !is_ident(c)).unwrap_or(attr.len());
        let name = &attr[..name_end];
        let mut tail = attr[name_end..].trim_start();
        let mut arg = None;
        if let Some(args) = tail.strip_prefix('(') {
            let end = args
                .find(')')
                .ok_or_else(|| format!("unterminated attribute in `{text}`"))?;
            arg = args[..end].trim().parse::<usize>().ok();
            tail = &args[end + 1..];
        }
        match name {
            "align" => align = arg,
            "size" => size = arg,
            _ => {}
        }
        rest = tail.trim_start();
    }
    let (name, ty) = rest
        .split_once(':')
        .ok_or_else(|| format!("malformed struct member `{text}`"))?;
    Ok(Member {
        name: name.trim().to_string(),
        ty: ty.chars().filter(|c| !c.is_whitespace()).collect(),
        align,
        size,
    })
}

/// Split on `sep` outside of `<...>` and `(...)`.
fn top_level_split(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '<' | '(' => depth += 1,
            '>' | ')' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use cgmath::{SquareMatrix, Zero};

    use super::*;

    const LIGHTS: &str = r#"
        struct PointLight {
            lightColor: vec3<f32>,
            lightPos: vec3<f32>,
            ambientIntensity: f32,
            specularStrength: f32,
            constant: f32,
            linear: f32,
            quadratic: f32,
        }

        // the block every scene program declares
        struct Uniforms {
            model: mat4x4<f32>,
            view: mat4x4<f32>,
            projection: mat4x4<f32>,
            pointLights: array<PointLight, 2>,
            u_DiffuseMap: i32, /* sampler slot */
            u_DetailMap: i32,
        }

        struct VertexInput {
            @location(0) position: vec3<f32>,
        }

        @group(0) @binding(0) var<uniform> uniforms: Uniforms;
    "#;

    #[test]
    fn flattens_nested_arrays_of_structs() {
        let layout = UniformLayout::reflect(LIGHTS).unwrap();
        let offset = |name: &str| layout.field(name).unwrap().offset;
        assert_eq!(offset("model"), 0);
        assert_eq!(offset("view"), 64);
        assert_eq!(offset("projection"), 128);
        assert_eq!(offset("pointLights[0].lightColor"), 192);
        assert_eq!(offset("pointLights[0].lightPos"), 208);
        assert_eq!(offset("pointLights[0].ambientIntensity"), 220);
        assert_eq!(offset("pointLights[0].quadratic"), 236);
        assert_eq!(offset("pointLights[1].lightColor"), 240);
        assert_eq!(offset("u_DiffuseMap"), 288);
        assert_eq!(offset("u_DetailMap"), 292);
        assert_eq!(layout.size(), 304);
        assert!(layout.field("position").is_none());
    }

    #[test]
    fn module_without_uniforms_has_empty_layout() {
        let layout = UniformLayout::reflect("@vertex fn vs_main() {}").unwrap();
        assert!(layout.is_empty());
    }

    #[test]
    fn explicit_align_and_size_attributes() {
        let layout = UniformLayout::reflect(
            "struct Uniforms { a: f32, @align(16) b: f32, @size(32) c: vec4f, d: f32 }",
        )
        .unwrap();
        assert_eq!(layout.field("b").unwrap().offset, 16);
        assert_eq!(layout.field("c").unwrap().offset, 32);
        assert_eq!(layout.field("d").unwrap().offset, 64);
    }

    #[test]
    fn rejects_runtime_sized_and_unknown_types() {
        assert!(UniformLayout::reflect("struct Uniforms { a: array<f32> }").is_err());
        assert!(UniformLayout::reflect("struct Uniforms { a: Mystery }").is_err());
        assert!(UniformLayout::reflect("struct Uniforms { a: mat2x3<f32> }").is_err());
    }

    #[test]
    fn integer_vectors_and_mat3_follow_wgsl_layout() {
        let layout = UniformLayout::reflect(
            "struct Uniforms { a: f32, b: vec3<i32>, c: vec4<u32>, d: vec2i, e: mat3x3<f32>, f: u32 }",
        )
        .unwrap();
        let field = |name: &str| layout.field(name).unwrap();
        assert_eq!((field("b").offset, field("b").kind), (16, UniformKind::IVec3));
        assert_eq!((field("c").offset, field("c").kind), (32, UniformKind::UVec4));
        assert_eq!((field("d").offset, field("d").kind), (48, UniformKind::IVec2));
        assert_eq!((field("e").offset, field("e").kind), (64, UniformKind::Mat3));
        assert_eq!(field("f").offset, 112);
        assert_eq!(layout.size(), 128);

        let mut block = UniformBlock::new(Arc::new(layout));
        assert!(!block.set("b", Uniform::Vec3(Vector3::new(1.0, 2.0, 3.0))));
        assert_eq!(block.get("e"), None);
    }

    #[test]
    fn nested_block_comments_are_skipped() {
        let layout = UniformLayout::reflect(
            "/* outer /* struct Uniforms { hidden: f32 } */ still comment */
             struct Uniforms { visible: vec4f }",
        )
        .unwrap();
        assert!(layout.field("hidden").is_none());
        assert_eq!(layout.field("visible").unwrap().offset, 0);
        assert_eq!(layout.size(), 16);
    }

    #[test]
    fn block_round_trips_values_and_checks_types() {
        let layout = Arc::new(UniformLayout::reflect(LIGHTS).unwrap());
        let mut block = UniformBlock::new(layout);
        let model = Matrix4::from_translation(Vector3::new(1.0, 2.0, 3.0));
        assert!(block.set("model", model.into()));
        assert!(block.set("pointLights[1].linear", Uniform::Float(0.09)));
        assert!(block.set("u_DetailMap", Uniform::Int(1)));
        assert!(!block.set("u_DetailMap", Uniform::Float(1.0)));
        assert!(!block.set("pointLights[2].linear", Uniform::Float(0.1)));

        assert_eq!(block.get("model"), Some(Uniform::Mat4(model)));
        assert_eq!(block.get("u_DetailMap"), Some(Uniform::Int(1)));
        match block.get("pointLights[1].linear") {
            Some(Uniform::Float(v)) => assert_relative_eq!(v, 0.09),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(block.get("view"), Some(Uniform::Mat4(Matrix4::zero())));
        assert_ne!(block.get("view"), Some(Uniform::Mat4(Matrix4::identity())));
    }
}
