//! GLSL 3.30 sources for the built-in passes.

use crate::environment::ShaderSource;

pub const PROJ_MAT: &str = "projMat";
pub const VIEW_MAT: &str = "viewMat";
pub const MODEL_MAT: &str = "modelMat";
pub const COLOR: &str = "color";

const MESH_VERT: &str = r#"#version 330 core
layout (location = 0) in vec3 position;
layout (location = 1) in vec3 normal;
layout (location = 2) in vec2 uv;

uniform mat4 projMat;
uniform mat4 viewMat;
uniform mat4 modelMat;

out vec3 vNormal;
out vec2 vUv;

void main() {
    vNormal = mat3(transpose(inverse(modelMat))) * normal;
    vUv = uv;
    gl_Position = projMat * viewMat * modelMat * vec4(position, 1.0);
}
"#;

const MESH_FRAG: &str = r#"#version 330 core
layout (location = 0) out vec4 fragColor;
layout (location = 1) out vec4 bloomColor;
layout (location = 2) out vec4 customColor;

in vec3 vNormal;
in vec2 vUv;

uniform vec3 color;
uniform bool bloom;
uniform bool hasDiffuse;
uniform sampler2D diffuseMap;

void main() {
    vec3 base = color;
    if (hasDiffuse) {
        base *= texture(diffuseMap, vUv).rgb;
    }
    float light = max(dot(normalize(vNormal), normalize(vec3(0.4, 1.0, 0.3))), 0.0) * 0.7 + 0.3;
    fragColor = vec4(base * light, 1.0);
    bloomColor = bloom ? vec4(base, 1.0) : vec4(0.0, 0.0, 0.0, 1.0);
    customColor = vec4(base, 1.0);
}
"#;

/// Unlit single-color output. Drives both the id pick pass and the gizmo.
const FLAT_FRAG: &str = r#"#version 330 core
layout (location = 0) out vec4 fragColor;
layout (location = 1) out vec4 bloomColor;

uniform vec3 color;

void main() {
    fragColor = vec4(color, 1.0);
    bloomColor = vec4(0.0, 0.0, 0.0, 1.0);
}
"#;

const SKYBOX_VERT: &str = r#"#version 330 core
layout (location = 0) in vec3 position;

uniform mat4 projMat;
uniform mat4 viewMat;

out vec3 vDir;

void main() {
    vDir = position;
    vec4 pos = projMat * mat4(mat3(viewMat)) * vec4(position, 1.0);
    gl_Position = pos.xyww;
}
"#;

const SKYBOX_FRAG: &str = r#"#version 330 core
layout (location = 0) out vec4 fragColor;
layout (location = 1) out vec4 bloomColor;
layout (location = 2) out vec4 customColor;
layout (location = 3) out vec4 skyboxColor;

in vec3 vDir;
uniform samplerCube skybox;

void main() {
    vec4 sky = texture(skybox, vDir);
    fragColor = sky;
    bloomColor = vec4(0.0, 0.0, 0.0, 1.0);
    customColor = vec4(0.0);
    skyboxColor = sky;
}
"#;

const GRID_VERT: &str = r#"#version 330 core
uniform mat4 projMat;
uniform mat4 viewMat;

out vec3 nearPoint;
out vec3 farPoint;

const vec3 corners[6] = vec3[](
    vec3(1, 1, 0), vec3(-1, -1, 0), vec3(-1, 1, 0),
    vec3(-1, -1, 0), vec3(1, 1, 0), vec3(1, -1, 0)
);

vec3 unproject(float x, float y, float z) {
    vec4 p = inverse(viewMat) * inverse(projMat) * vec4(x, y, z, 1.0);
    return p.xyz / p.w;
}

void main() {
    vec3 p = corners[gl_VertexID];
    nearPoint = unproject(p.x, p.y, 0.0);
    farPoint = unproject(p.x, p.y, 1.0);
    gl_Position = vec4(p, 1.0);
}
"#;

const GRID_FRAG: &str = r#"#version 330 core
layout (location = 0) out vec4 fragColor;

in vec3 nearPoint;
in vec3 farPoint;

void main() {
    float t = -nearPoint.y / (farPoint.y - nearPoint.y);
    if (t <= 0.0) {
        discard;
    }
    vec3 p = nearPoint + t * (farPoint - nearPoint);
    vec2 coord = p.xz;
    vec2 derivative = fwidth(coord);
    vec2 grid = abs(fract(coord - 0.5) - 0.5) / derivative;
    float line = min(grid.x, grid.y);
    float alpha = 1.0 - min(line, 1.0);
    if (alpha < 0.05) {
        discard;
    }
    fragColor = vec4(vec3(0.35), alpha * 0.6);
}
"#;

const QUAD_VERT: &str = r#"#version 330 core
layout (location = 0) in vec2 position;
layout (location = 1) in vec2 uv;

out vec2 vUv;

void main() {
    vUv = uv;
    gl_Position = vec4(position, 0.0, 1.0);
}
"#;

const BLUR_FRAG: &str = r#"#version 330 core
out vec4 fragColor;
in vec2 vUv;

uniform sampler2D image;
uniform bool horizontal;

const float weight[5] = float[](0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216);

void main() {
    vec2 offset = 1.0 / vec2(textureSize(image, 0));
    vec3 result = texture(image, vUv).rgb * weight[0];
    for (int i = 1; i < 5; ++i) {
        vec2 step = horizontal ? vec2(offset.x * i, 0.0) : vec2(0.0, offset.y * i);
        result += texture(image, vUv + step).rgb * weight[i];
        result += texture(image, vUv - step).rgb * weight[i];
    }
    fragColor = vec4(result, 1.0);
}
"#;

const COMPOSITE_FRAG: &str = r#"#version 330 core
out vec4 fragColor;
in vec2 vUv;

uniform sampler2D scene;
uniform sampler2D bloomBlur;
uniform bool bloom;
uniform float bloomIntensity;
uniform float exposure;
uniform float gamma;

void main() {
    vec3 hdr = texture(scene, vUv).rgb;
    if (bloom) {
        hdr += texture(bloomBlur, vUv).rgb * bloomIntensity;
    }
    vec3 mapped = vec3(1.0) - exp(-hdr * exposure);
    mapped = pow(mapped, vec3(1.0 / gamma));
    fragColor = vec4(mapped, 1.0);
}
"#;

pub const MESH: ShaderSource = ShaderSource {
    name: "mesh",
    vertex: MESH_VERT,
    fragment: MESH_FRAG,
};

pub const FLAT: ShaderSource = ShaderSource {
    name: "flat",
    vertex: MESH_VERT,
    fragment: FLAT_FRAG,
};

pub const SKYBOX: ShaderSource = ShaderSource {
    name: "skybox",
    vertex: SKYBOX_VERT,
    fragment: SKYBOX_FRAG,
};

pub const GRID: ShaderSource = ShaderSource {
    name: "grid",
    vertex: GRID_VERT,
    fragment: GRID_FRAG,
};

pub const BLUR: ShaderSource = ShaderSource {
    name: "blur",
    vertex: QUAD_VERT,
    fragment: BLUR_FRAG,
};

pub const COMPOSITE: ShaderSource = ShaderSource {
    name: "composite",
    vertex: QUAD_VERT,
    fragment: COMPOSITE_FRAG,
};
