//! Procedure chains that write a field layer
//!
//! A `ProcedureStack` keeps a registry of named compute procedures (shader
//! plus parameter specs) and, per layer, an ordered chain of instances. The
//! caller binds the output image; `dispatch` runs the layer's chain into it
//! with a barrier after every instance so each one sees its predecessor.

use rustc_hash::FxHashMap;
use serde_json::{json, Map, Value};

use crate::error::{OptionExt, TerrainError, TerrainResult};
use crate::gpu::{ComputeShaderDesc, GpuBackend, ShaderHandle, UniformValue};

/// Uniforms set by the stack itself, never by parameters
pub const RESOLUTION_UNIFORM: &str = "uResolution";
pub const LAYER_UNIFORM: &str = "uLayer";

/// Editable parameter kinds with their ranges
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    Int { min: i32, max: i32, default: i32 },
    Float { min: f32, max: f32, default: f32 },
    Color { default: [f32; 3] },
    /// `(label, uniform value)` options.
    Enum {
        options: &'static [(&'static str, i32)],
        default: i32,
    },
    Vec2 { min: f32, max: f32, default: [f32; 2] },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub uniform: &'static str,
    pub label: &'static str,
    pub kind: ParamKind,
}

impl ParamSpec {
    pub const fn new(uniform: &'static str, label: &'static str, kind: ParamKind) -> Self {
        Self {
            uniform,
            label,
            kind,
        }
    }

    pub fn default_value(&self) -> UniformValue {
        match self.kind {
            ParamKind::Int { default, .. } => UniformValue::Int(default),
            ParamKind::Float { default, .. } => UniformValue::Float(default),
            ParamKind::Color { default } => UniformValue::Vec3(default),
            ParamKind::Enum { default, .. } => UniformValue::Int(default),
            ParamKind::Vec2 { default, .. } => UniformValue::Vec2(default),
        }
    }

    /// Clamp `value` into range. Kind mismatches and unknown enum values
    /// are errors.
    pub fn sanitize(&self, procedure: &str, value: UniformValue) -> TerrainResult<UniformValue> {
        let invalid = |reason: String| TerrainError::InvalidParameter {
            procedure: procedure.to_string(),
            uniform: self.uniform.to_string(),
            reason,
        };

        match (self.kind, value) {
            (ParamKind::Int { min, max, .. }, UniformValue::Int(v)) => {
                Ok(UniformValue::Int(v.clamp(min, max)))
            }
            (ParamKind::Float { min, max, .. }, UniformValue::Float(v)) => {
                if !v.is_finite() {
                    return Err(invalid(format!("{} is not finite", v)));
                }
                Ok(UniformValue::Float(v.clamp(min, max)))
            }
            (ParamKind::Color { .. }, UniformValue::Vec3(c)) => {
                if c.iter().any(|v| !v.is_finite()) {
                    return Err(invalid(format!("{:?} is not finite", c)));
                }
                Ok(UniformValue::Vec3(c.map(|v| v.clamp(0.0, 1.0))))
            }
            (ParamKind::Enum { options, .. }, UniformValue::Int(v)) => {
                if options.iter().any(|(_, option)| *option == v) {
                    Ok(UniformValue::Int(v))
                } else {
                    Err(invalid(format!("{} is not one of {:?}", v, options)))
                }
            }
            (ParamKind::Vec2 { min, max, .. }, UniformValue::Vec2(v)) => {
                if v.iter().any(|c| !c.is_finite()) {
                    return Err(invalid(format!("{:?} is not finite", v)));
                }
                Ok(UniformValue::Vec2(v.map(|c| c.clamp(min, max))))
            }
            (kind, value) => Err(invalid(format!(
                "expected {:?}, found {:?}",
                kind, value
            ))),
        }
    }

    fn to_json(&self, value: &UniformValue) -> Value {
        match value {
            UniformValue::Int(v) => json!(v),
            UniformValue::Float(v) => json!(v),
            UniformValue::Vec2(v) => json!(v),
            UniformValue::Vec3(v) => json!(v),
            other => Value::String(format!("{:?}", other)),
        }
    }

    fn from_json(&self, value: &Value) -> Option<UniformValue> {
        let floats = |value: &Value| -> Option<Vec<f32>> {
            value
                .as_array()?
                .iter()
                .map(|v| v.as_f64().map(|f| f as f32))
                .collect()
        };
        match self.kind {
            ParamKind::Int { .. } | ParamKind::Enum { .. } => {
                value.as_i64().map(|v| UniformValue::Int(v as i32))
            }
            ParamKind::Float { .. } => value.as_f64().map(|v| UniformValue::Float(v as f32)),
            ParamKind::Color { .. } => match floats(value)?.as_slice() {
                [r, g, b] => Some(UniformValue::Vec3([*r, *g, *b])),
                _ => None,
            },
            ParamKind::Vec2 { .. } => match floats(value)?.as_slice() {
                [x, y] => Some(UniformValue::Vec2([*x, *y])),
                _ => None,
            },
        }
    }
}

/// A procedure that can be registered with an editor
#[derive(Debug, Clone)]
pub struct ProcedureDef {
    pub name: &'static str,
    pub shader: ComputeShaderDesc,
    pub params: Vec<ParamSpec>,
}

/// One procedure in a layer's chain with its current parameter values
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureInstance {
    pub procedure: String,
    /// Parallel to the procedure's `params`.
    pub values: Vec<UniformValue>,
}

#[derive(Debug)]
struct RegisteredProcedure {
    def: ProcedureDef,
    shader: ShaderHandle,
}

/// Capability shared by every field editor
pub trait FieldEditor {
    fn name(&self) -> &str;

    fn layer_count(&self) -> usize;

    fn register_procedure(
        &mut self,
        backend: &mut dyn GpuBackend,
        def: ProcedureDef,
    ) -> TerrainResult<()>;

    /// Append an instance with default parameters. Returns its index.
    fn add_instance(&mut self, layer: usize, procedure: &str) -> TerrainResult<usize>;

    fn remove_instance(&mut self, layer: usize, index: usize) -> TerrainResult<ProcedureInstance>;

    /// Returns whether the stored value changed.
    fn set_parameter(
        &mut self,
        layer: usize,
        index: usize,
        uniform: &str,
        value: UniformValue,
    ) -> TerrainResult<bool>;

    /// Run the layer's chain into whatever is bound as output. Returns the
    /// number of dispatches.
    fn dispatch(
        &self,
        backend: &mut dyn GpuBackend,
        layer: usize,
        resolution: u32,
    ) -> TerrainResult<u32>;

    fn serialize(&self) -> Value;

    fn deserialize(&mut self, value: &Value) -> TerrainResult<()>;
}

#[derive(Debug)]
pub struct ProcedureStack {
    name: &'static str,
    registry: FxHashMap<String, RegisteredProcedure>,
    registration_order: Vec<String>,
    layers: Vec<Vec<ProcedureInstance>>,
}

impl ProcedureStack {
    pub fn new(name: &'static str, layers: usize) -> Self {
        Self {
            name,
            registry: FxHashMap::default(),
            registration_order: Vec::new(),
            layers: vec![Vec::new(); layers],
        }
    }

    pub fn registered(&self) -> impl Iterator<Item = &str> {
        self.registration_order.iter().map(String::as_str)
    }

    pub fn instances(&self, layer: usize) -> &[ProcedureInstance] {
        self.layers.get(layer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn params(&self, procedure: &str) -> Option<&[ParamSpec]> {
        self.registry.get(procedure).map(|r| r.def.params.as_slice())
    }

    pub fn parameter(&self, layer: usize, index: usize, uniform: &str) -> Option<UniformValue> {
        let instance = self.layers.get(layer)?.get(index)?;
        let params = self.params(&instance.procedure)?;
        let slot = params.iter().position(|p| p.uniform == uniform)?;
        instance.values.get(slot).copied()
    }

    pub fn clear_layer(&mut self, layer: usize) -> TerrainResult<()> {
        self.check_layer(layer)?;
        self.layers[layer].clear();
        Ok(())
    }

    fn check_layer(&self, layer: usize) -> TerrainResult<()> {
        if layer < self.layers.len() {
            Ok(())
        } else {
            Err(TerrainError::LayerOutOfRange {
                layer,
                layers: self.layers.len(),
            })
        }
    }

    fn lookup(&self, procedure: &str) -> TerrainResult<&RegisteredProcedure> {
        self.registry
            .get(procedure)
            .ok_or_else(|| TerrainError::UnknownProcedure {
                editor: self.name.to_string(),
                name: procedure.to_string(),
            })
    }

    fn instance_from_json(&self, value: &Value) -> TerrainResult<ProcedureInstance> {
        let procedure = value
            .get("Procedure")
            .and_then(Value::as_str)
            .ok_or_else(|| TerrainError::DeserializationError {
                context: self.name.to_string(),
                error: "instance without a \"Procedure\" name".to_string(),
            })?;
        let registered = self.lookup(procedure)?;
        let stored = value.get("Params").and_then(Value::as_object);

        let mut values = Vec::with_capacity(registered.def.params.len());
        for spec in &registered.def.params {
            let parsed = stored
                .and_then(|params| params.get(spec.uniform))
                .and_then(|v| spec.from_json(v));
            let value = match parsed {
                Some(v) => spec.sanitize(procedure, v)?,
                None => {
                    log::warn!(
                        "[ProcedureStack::deserialize] {} {}: missing {}, using default",
                        self.name,
                        procedure,
                        spec.uniform
                    );
                    spec.default_value()
                }
            };
            values.push(value);
        }

        Ok(ProcedureInstance {
            procedure: procedure.to_string(),
            values,
        })
    }
}

impl FieldEditor for ProcedureStack {
    fn name(&self) -> &str {
        self.name
    }

    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn register_procedure(
        &mut self,
        backend: &mut dyn GpuBackend,
        def: ProcedureDef,
    ) -> TerrainResult<()> {
        for spec in &def.params {
            if def.shader.uniforms.field_type(spec.uniform) != Some(spec.default_value().ty()) {
                return Err(TerrainError::InvalidParameter {
                    procedure: def.name.to_string(),
                    uniform: spec.uniform.to_string(),
                    reason: "not declared by the shader with this type".to_string(),
                });
            }
        }

        let shader = backend.create_compute_shader(&def.shader)?;
        log::debug!(
            "[ProcedureStack::register_procedure] {}: '{}' with {} parameters",
            self.name,
            def.name,
            def.params.len()
        );

        let name = def.name.to_string();
        if self
            .registry
            .insert(name.clone(), RegisteredProcedure { def, shader })
            .is_none()
        {
            self.registration_order.push(name);
        }
        Ok(())
    }

    fn add_instance(&mut self, layer: usize, procedure: &str) -> TerrainResult<usize> {
        self.check_layer(layer)?;
        let values = self
            .lookup(procedure)?
            .def
            .params
            .iter()
            .map(ParamSpec::default_value)
            .collect();

        let chain = &mut self.layers[layer];
        chain.push(ProcedureInstance {
            procedure: procedure.to_string(),
            values,
        });
        Ok(chain.len() - 1)
    }

    fn remove_instance(&mut self, layer: usize, index: usize) -> TerrainResult<ProcedureInstance> {
        self.check_layer(layer)?;
        let chain = &mut self.layers[layer];
        if index >= chain.len() {
            return Err(TerrainError::ResourceNotFound {
                resource_type: format!("{} procedure instance", self.name),
                id: format!("layer {} index {}", layer, index),
            });
        }
        Ok(chain.remove(index))
    }

    fn set_parameter(
        &mut self,
        layer: usize,
        index: usize,
        uniform: &str,
        value: UniformValue,
    ) -> TerrainResult<bool> {
        self.check_layer(layer)?;
        let instance = self.layers[layer].get(index).ok_or_not_found(
            &format!("{} procedure instance", self.name),
            format_args!("layer {} index {}", layer, index),
        )?;
        let params = &self.lookup(&instance.procedure)?.def.params;
        let slot = params
            .iter()
            .position(|p| p.uniform == uniform)
            .ok_or_else(|| TerrainError::InvalidParameter {
                procedure: instance.procedure.clone(),
                uniform: uniform.to_string(),
                reason: "no such parameter".to_string(),
            })?;
        let value = params[slot].sanitize(&instance.procedure, value)?;

        let stored = &mut self.layers[layer][index].values[slot];
        if *stored == value {
            return Ok(false);
        }
        *stored = value;
        Ok(true)
    }

    fn dispatch(
        &self,
        backend: &mut dyn GpuBackend,
        layer: usize,
        resolution: u32,
    ) -> TerrainResult<u32> {
        self.check_layer(layer)?;
        let mut dispatches = 0;

        for instance in &self.layers[layer] {
            let registered = self.lookup(&instance.procedure)?;
            backend.bind_shader(registered.shader)?;
            backend.set_uniform(RESOLUTION_UNIFORM, UniformValue::Int(resolution as i32))?;
            backend.set_uniform(LAYER_UNIFORM, UniformValue::Int(layer as i32))?;
            for (spec, value) in registered.def.params.iter().zip(&instance.values) {
                backend.set_uniform(spec.uniform, *value)?;
            }
            backend.dispatch(resolution, resolution, 1)?;
            backend.memory_barrier();
            dispatches += 1;
        }

        log::trace!(
            "[ProcedureStack::dispatch] {} layer {}: {} procedures at {}x{}",
            self.name,
            layer,
            dispatches,
            resolution,
            resolution
        );
        Ok(dispatches)
    }

    fn serialize(&self) -> Value {
        let layers = self
            .layers
            .iter()
            .map(|chain| {
                chain
                    .iter()
                    .map(|instance| {
                        let mut params = Map::new();
                        if let Some(specs) = self.params(&instance.procedure) {
                            for (spec, value) in specs.iter().zip(&instance.values) {
                                params.insert(spec.uniform.to_string(), spec.to_json(value));
                            }
                        }
                        json!({ "Procedure": instance.procedure, "Params": params })
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        Value::Array(layers.into_iter().map(Value::Array).collect())
    }

    /// Replace every chain. Layers missing from `value` end up empty; extra
    /// layers are ignored. Nothing changes if any instance fails to parse.
    fn deserialize(&mut self, value: &Value) -> TerrainResult<()> {
        let stored = value
            .as_array()
            .ok_or_else(|| TerrainError::DeserializationError {
                context: self.name.to_string(),
                error: "expected an array of layers".to_string(),
            })?;
        if stored.len() > self.layers.len() {
            log::warn!(
                "[ProcedureStack::deserialize] {}: {} stored layers, {} in use",
                self.name,
                stored.len(),
                self.layers.len()
            );
        }

        let mut layers = vec![Vec::new(); self.layers.len()];
        for (chain, stored_chain) in layers.iter_mut().zip(stored) {
            let instances = stored_chain.as_array().ok_or_else(|| {
                TerrainError::DeserializationError {
                    context: self.name.to_string(),
                    error: "expected an array of procedure instances".to_string(),
                }
            })?;
            for instance in instances {
                chain.push(self.instance_from_json(instance)?);
            }
        }

        self.layers = layers;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::procedure_library::{height_fbm, material_height_procedures};
    use crate::gpu::shaders::slots;
    use crate::gpu::{FieldFormat, RecordingBackend, TextureSpec};

    fn stack(backend: &mut RecordingBackend, layers: usize) -> ProcedureStack {
        let mut stack = ProcedureStack::new("Height", layers);
        for def in material_height_procedures() {
            stack.register_procedure(backend, def).unwrap();
        }
        stack
    }

    #[test]
    fn test_registration_keeps_order() {
        let mut backend = RecordingBackend::new();
        let stack = stack(&mut backend, 2);
        let names: Vec<&str> = stack.registered().collect();
        assert_eq!(names, vec!["Const Value", "FBM", "Voronoi"]);
    }

    #[test]
    fn test_add_instance_uses_defaults() {
        let mut backend = RecordingBackend::new();
        let mut stack = stack(&mut backend, 2);
        let index = stack.add_instance(1, "FBM").unwrap();
        assert_eq!(index, 0);
        assert_eq!(stack.parameter(1, 0, "uOctaves"), Some(UniformValue::Int(8)));
        assert!(stack.instances(0).is_empty());
    }

    #[test]
    fn test_unknown_procedure_and_layer() {
        let mut backend = RecordingBackend::new();
        let mut stack = stack(&mut backend, 2);
        assert!(matches!(
            stack.add_instance(0, "Perlin"),
            Err(TerrainError::UnknownProcedure { .. })
        ));
        assert!(matches!(
            stack.add_instance(5, "FBM"),
            Err(TerrainError::LayerOutOfRange { layer: 5, layers: 2 })
        ));
    }

    #[test]
    fn test_cleared_layer_has_no_instances() {
        let mut backend = RecordingBackend::new();
        let mut stack = stack(&mut backend, 2);
        stack.add_instance(1, "FBM").unwrap();
        stack.add_instance(1, "Voronoi").unwrap();
        stack.add_instance(0, "FBM").unwrap();

        stack.clear_layer(1).unwrap();
        assert!(stack.instances(1).is_empty());
        assert_eq!(stack.instances(0).len(), 1);
        match stack.set_parameter(1, 0, "uOctaves", UniformValue::Int(3)) {
            Err(TerrainError::ResourceNotFound { resource_type, id }) => {
                assert_eq!(resource_type, "Height procedure instance");
                assert_eq!(id, "layer 1 index 0");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_set_parameter_clamps_and_reports_change() {
        let mut backend = RecordingBackend::new();
        let mut stack = stack(&mut backend, 1);
        stack.add_instance(0, "FBM").unwrap();

        assert!(stack
            .set_parameter(0, 0, "uOctaves", UniformValue::Int(40))
            .unwrap());
        assert_eq!(stack.parameter(0, 0, "uOctaves"), Some(UniformValue::Int(16)));
        assert!(!stack
            .set_parameter(0, 0, "uOctaves", UniformValue::Int(16))
            .unwrap());

        assert!(matches!(
            stack.set_parameter(0, 0, "uOctaves", UniformValue::Float(2.0)),
            Err(TerrainError::InvalidParameter { .. })
        ));
        assert!(stack
            .set_parameter(0, 0, "uBlendMode", UniformValue::Int(17))
            .is_err());
    }

    #[test]
    fn test_dispatch_runs_chain_with_barriers() {
        let mut backend = RecordingBackend::new();
        let mut stack = stack(&mut backend, 3);
        stack.add_instance(2, "Const Value").unwrap();
        stack.add_instance(2, "Voronoi").unwrap();

        let heights = backend
            .create_texture(&TextureSpec::array("Heights", 64, 3, FieldFormat::R32Float, false))
            .unwrap();
        backend.bind_image(slots::PROCEDURE_OUTPUT, heights, 2);
        backend.clear_commands();

        assert_eq!(stack.dispatch(&mut backend, 2, 64).unwrap(), 2);
        let labels: Vec<&str> = backend.dispatches().map(|d| d.label).collect();
        assert_eq!(labels, vec!["Height Const Value", "Height Voronoi"]);
        assert_eq!(backend.barrier_count(), 2);

        let voronoi = backend.dispatches().nth(1).unwrap();
        assert_eq!(voronoi.uniform("uLayer"), Some(UniformValue::Int(2)));
        assert_eq!(voronoi.uniform("uResolution"), Some(UniformValue::Int(64)));
        assert_eq!(voronoi.invocations, [64, 64, 1]);
        assert_eq!(voronoi.image_layer(slots::PROCEDURE_OUTPUT), Some((heights, 2)));
    }

    #[test]
    fn test_serialize_round_trip_preserves_chains() {
        let mut backend = RecordingBackend::new();
        let mut stack_a = stack(&mut backend, 2);
        stack_a.add_instance(0, "FBM").unwrap();
        stack_a
            .set_parameter(0, 0, "uOffset", UniformValue::Vec2([1.5, -2.0]))
            .unwrap();
        stack_a.add_instance(1, "Voronoi").unwrap();
        stack_a.add_instance(1, "Const Value").unwrap();

        let document = stack_a.serialize();
        assert_eq!(document[0][0]["Procedure"], "FBM");
        assert_eq!(document[0][0]["Params"]["uOffset"], json!([1.5, -2.0]));

        let mut stack_b = stack(&mut backend, 2);
        stack_b.deserialize(&document).unwrap();
        assert_eq!(stack_b.instances(0), stack_a.instances(0));
        assert_eq!(stack_b.instances(1), stack_a.instances(1));
    }

    #[test]
    fn test_deserialize_fills_missing_params_and_rejects_unknown() {
        let mut backend = RecordingBackend::new();
        let mut stack = stack(&mut backend, 1);
        stack
            .deserialize(&json!([[{ "Procedure": "FBM", "Params": { "uOctaves": 3 } }]]))
            .unwrap();
        assert_eq!(stack.parameter(0, 0, "uOctaves"), Some(UniformValue::Int(3)));
        assert_eq!(stack.parameter(0, 0, "uRoughness"), Some(UniformValue::Float(0.5)));

        let before = stack.instances(0).to_vec();
        assert!(stack
            .deserialize(&json!([[{ "Procedure": "Ridged" }]]))
            .is_err());
        assert_eq!(stack.instances(0), before.as_slice());
    }

    #[test]
    fn test_register_rejects_undeclared_uniform() {
        let mut backend = RecordingBackend::new();
        let mut stack = ProcedureStack::new("Height", 1);
        let mut def = height_fbm();
        def.params.push(ParamSpec::new(
            "uMissing",
            "Missing",
            ParamKind::Float {
                min: 0.0,
                max: 1.0,
                default: 0.0,
            },
        ));
        assert!(stack.register_procedure(&mut backend, def).is_err());
    }
}
