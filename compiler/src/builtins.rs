// builtins.rs — Catalog of math builtins that must survive flattening
//
// The vectorizer widens calls to these symbols itself, so their bodies must
// never be inlined into an indexed function before it runs. Names are the
// fully-mangled scalar and vector overloads of the runtime math library.

use std::collections::HashSet;
use std::sync::OnceLock;

use crate::ir::Module;

pub const NO_INLINE_BUILTINS: &[&str] = &[
    "_Z5clampDv4_fS_S_", "_Z5clampDv3_fS_S_", "_Z5clampDv2_fS_S_",
    "_Z5clampfff", "_Z5clampDv4_fff", "_Z5clampDv3_fff",
    "_Z5clampDv2_fff", "_Z4acosf", "_Z4acosDv2_f",
    "_Z4acosDv4_f", "_Z4acosDv3_f", "_Z5acoshf",
    "_Z5acoshDv2_f", "_Z5acoshDv4_f", "_Z5acoshDv3_f",
    "_Z6acospif", "_Z6acospiDv2_f", "_Z6acospiDv4_f",
    "_Z6acospiDv3_f", "_Z4asinf", "_Z4asinDv2_f",
    "_Z4asinDv4_f", "_Z4asinDv3_f", "_Z5asinhf",
    "_Z5asinhDv2_f", "_Z5asinhDv4_f", "_Z5asinhDv3_f",
    "_Z6asinpif", "_Z6asinpiDv2_f", "_Z6asinpiDv4_f",
    "_Z6asinpiDv3_f", "_Z4atanf", "_Z4atanDv2_f",
    "_Z4atanDv4_f", "_Z4atanDv3_f", "_Z5atan2ff",
    "_Z5atan2Dv2_fS_", "_Z5atan2Dv4_fS_", "_Z5atan2Dv3_fS_",
    "_Z5atanhf", "_Z5atanhDv2_f", "_Z5atanhDv4_f",
    "_Z5atanhDv3_f", "_Z6atanpif", "_Z6atanpiDv2_f",
    "_Z6atanpiDv4_f", "_Z6atanpiDv3_f", "_Z7atan2piff",
    "_Z7atan2piDv2_fS_", "_Z7atan2piDv4_fS_", "_Z7atan2piDv3_fS_",
    "_Z4cbrtf", "_Z4cbrtDv2_f", "_Z4cbrtDv4_f",
    "_Z4cbrtDv3_f", "_Z4ceilf", "_Z4ceilDv2_f",
    "_Z4ceilDv4_f", "_Z4ceilDv3_f", "_Z8copysignff",
    "_Z8copysignDv2_fS_", "_Z8copysignDv4_fS_", "_Z8copysignDv3_fS_",
    "_Z3cosf", "_Z3cosDv2_f", "_Z3cosDv4_f",
    "_Z3cosDv3_f", "_Z4coshf", "_Z4coshDv2_f",
    "_Z4coshDv4_f", "_Z4coshDv3_f", "_Z5cospif",
    "_Z5cospiDv2_f", "_Z5cospiDv4_f", "_Z5cospiDv3_f",
    "_Z4erfcf", "_Z4erfcDv2_f", "_Z4erfcDv4_f",
    "_Z4erfcDv3_f", "_Z3erff", "_Z3erfDv2_f",
    "_Z3erfDv4_f", "_Z3erfDv3_f", "_Z3expf",
    "_Z3expDv2_f", "_Z3expDv4_f", "_Z3expDv3_f",
    "_Z4exp2f", "_Z4exp2Dv2_f", "_Z4exp2Dv4_f",
    "_Z4exp2Dv3_f", "_Z5exp10f", "_Z5exp10Dv2_f",
    "_Z5exp10Dv4_f", "_Z5exp10Dv3_f", "_Z5expm1f",
    "_Z5expm1Dv2_f", "_Z5expm1Dv4_f", "_Z5expm1Dv3_f",
    "_Z4fabsf", "_Z4fabsDv2_f", "_Z4fabsDv4_f",
    "_Z4fabsDv3_f", "_Z4fdimff", "_Z4fdimDv2_fS_",
    "_Z4fdimDv4_fS_", "_Z4fdimDv3_fS_", "_Z5floorf",
    "_Z5floorDv2_f", "_Z5floorDv4_f", "_Z5floorDv3_f",
    "_Z3fmafff", "_Z3fmaDv2_fS_S_", "_Z3fmaDv4_fS_S_",
    "_Z3fmaDv3_fS_S_", "_Z4fmodff", "_Z4fmodDv2_fS_",
    "_Z4fmodDv4_fS_", "_Z4fmodDv3_fS_", "_Z5fractfPf",
    "_Z5fractDv2_fPS_", "_Z5fractDv4_fPS_", "_Z5fractDv3_fPS_",
    "_Z5frexpfPi", "_Z5frexpDv2_fPDv2_i", "_Z5frexpDv4_fPDv4_i",
    "_Z5frexpDv3_fPDv3_i", "_Z5hypotff", "_Z5hypotDv2_fS_",
    "_Z5hypotDv4_fS_", "_Z5hypotDv3_fS_", "_Z5ilogbf",
    "_Z5ilogbDv2_f", "_Z5ilogbDv4_f", "_Z5ilogbDv3_f",
    "_Z5ldexpfi", "_Z5ldexpDv2_fDv2_i", "_Z5ldexpDv4_fDv4_i",
    "_Z5ldexpDv3_fDv3_i", "_Z5ldexpDv2_fi", "_Z5ldexpDv4_fi",
    "_Z5ldexpDv3_fi", "_Z6lgammaf", "_Z6lgammaDv2_f",
    "_Z6lgammaDv4_f", "_Z6lgammaDv3_f", "_Z6lgammafPi",
    "_Z6lgammaDv2_fPDv2_i", "_Z6lgammaDv4_fPDv4_i", "_Z6lgammaDv3_fPDv3_i",
    "_Z3logf", "_Z3logDv2_f", "_Z3logDv4_f",
    "_Z3logDv3_f", "_Z5log10f", "_Z5log10Dv2_f",
    "_Z5log10Dv4_f", "_Z5log10Dv3_f", "_Z4log2f",
    "_Z4log2Dv2_f", "_Z4log2Dv4_f", "_Z4log2Dv3_f",
    "_Z5log1pf", "_Z5log1pDv2_f", "_Z5log1pDv4_f",
    "_Z5log1pDv3_f", "_Z4logbf", "_Z4logbDv2_f",
    "_Z4logbDv4_f", "_Z4logbDv3_f", "_Z4modffPf",
    "_Z4modfDv2_fPS_", "_Z4modfDv4_fPS_", "_Z4modfDv3_fPS_",
    "_Z9nextafterff", "_Z9nextafterDv2_fS_", "_Z9nextafterDv4_fS_",
    "_Z9nextafterDv3_fS_", "_Z3powff", "_Z3powDv2_fS_",
    "_Z3powDv4_fS_", "_Z3powDv3_fS_", "_Z4pownfi",
    "_Z4pownDv2_fDv2_i", "_Z4pownDv4_fDv4_i", "_Z4pownDv3_fDv3_i",
    "_Z4powrff", "_Z4powrDv2_fS_", "_Z4powrDv4_fS_",
    "_Z4powrDv3_fS_", "_Z9remainderff", "_Z9remainderDv2_fS_",
    "_Z9remainderDv4_fS_", "_Z9remainderDv3_fS_", "_Z6remquoffPi",
    "_Z6remquoDv2_fS_PDv2_i", "_Z6remquoDv4_fS_PDv4_i", "_Z6remquoDv3_fS_PDv3_i",
    "_Z4rintf", "_Z4rintDv2_f", "_Z4rintDv4_f",
    "_Z4rintDv3_f", "_Z5rootnfi", "_Z5rootnDv2_fDv2_i",
    "_Z5rootnDv4_fDv4_i", "_Z5rootnDv3_fDv3_i", "_Z5roundf",
    "_Z5roundDv2_f", "_Z5roundDv4_f", "_Z5roundDv3_f",
    "_Z5rsqrtf", "_Z5rsqrtDv2_f", "_Z5rsqrtDv4_f",
    "_Z5rsqrtDv3_f", "_Z3sinf", "_Z3sinDv2_f",
    "_Z3sinDv4_f", "_Z3sinDv3_f", "_Z6sincosfPf",
    "_Z6sincosDv2_fPS_", "_Z6sincosDv4_fPS_", "_Z6sincosDv3_fPS_",
    "_Z4sinhf", "_Z4sinhDv2_f", "_Z4sinhDv4_f",
    "_Z4sinhDv3_f", "_Z5sinpif", "_Z5sinpiDv2_f",
    "_Z5sinpiDv4_f", "_Z5sinpiDv3_f", "_Z3tanf",
    "_Z3tanDv2_f", "_Z3tanDv4_f", "_Z3tanDv3_f",
    "_Z4tanhf", "_Z4tanhDv2_f", "_Z4tanhDv4_f",
    "_Z4tanhDv3_f", "_Z5tanpif", "_Z5tanpiDv2_f",
    "_Z5tanpiDv4_f", "_Z5tanpiDv3_f", "_Z6tgammaf",
    "_Z6tgammaDv2_f", "_Z6tgammaDv4_f", "_Z6tgammaDv3_f",
    "_Z5truncf", "_Z5truncDv2_f", "_Z5truncDv4_f",
    "_Z5truncDv3_f", "_Z3absc", "_Z3absDv2_c",
    "_Z3absDv4_c", "_Z3absDv3_c", "_Z3abss",
    "_Z3absDv2_s", "_Z3absDv4_s", "_Z3absDv3_s",
    "_Z3absi", "_Z3absDv2_i", "_Z3absDv4_i",
    "_Z3absDv3_i", "_Z3clzh", "_Z3clzDv2_h",
    "_Z3clzDv4_h", "_Z3clzDv3_h", "_Z3clzc",
    "_Z3clzDv2_c", "_Z3clzDv4_c", "_Z3clzDv3_c",
    "_Z3clzt", "_Z3clzDv2_t", "_Z3clzDv4_t",
    "_Z3clzDv3_t", "_Z3clzs", "_Z3clzDv2_s",
    "_Z3clzDv4_s", "_Z3clzDv3_s", "_Z3clzj",
    "_Z3clzDv2_j", "_Z3clzDv4_j", "_Z3clzDv3_j",
    "_Z3clzi", "_Z3clzDv2_i", "_Z3clzDv4_i",
    "_Z3clzDv3_i", "_Z9half_sqrtf", "_Z9half_sqrtDv2_f",
    "_Z9half_sqrtDv4_f", "_Z9half_sqrtDv3_f", "_Z10half_rsqrtf",
    "_Z10half_rsqrtDv2_f", "_Z10half_rsqrtDv4_f", "_Z10half_rsqrtDv3_f",
    "_Z4sqrtf", "_Z4sqrtDv2_f", "_Z4sqrtDv4_f",
    "_Z4sqrtDv3_f", "_Z3dotff", "_Z3dotDv2_fS_",
    "_Z3dotDv4_fS_", "_Z3dotDv3_fS_",
];

/// The catalog as a set, built on first use.
pub fn catalog() -> &'static HashSet<&'static str> {
    static CATALOG: OnceLock<HashSet<&'static str>> = OnceLock::new();
    CATALOG.get_or_init(|| NO_INLINE_BUILTINS.iter().copied().collect())
}

pub fn is_protected(symbol: &str) -> bool {
    catalog().contains(symbol)
}

/// Catalog entries present in `module` with at least one use, in catalog order.
pub fn used_in(module: &Module) -> Vec<&'static str> {
    NO_INLINE_BUILTINS
        .iter()
        .copied()
        .filter(|name| module.function(name).is_some() && module.uses_of(name) > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, Param, Type};

    #[test]
    fn catalog_has_no_duplicates() {
        assert_eq!(catalog().len(), NO_INLINE_BUILTINS.len());
        assert_eq!(NO_INLINE_BUILTINS.len(), 302);
    }

    #[test]
    fn catalog_is_mangled() {
        assert!(NO_INLINE_BUILTINS.iter().all(|n| n.starts_with("_Z")));
    }

    #[test]
    fn membership() {
        assert!(is_protected("_Z3cosf"));
        assert!(is_protected("_Z5clampDv4_fS_S_"));
        assert!(!is_protected("cos"));
        assert!(!is_protected("get.id"));
    }

    #[test]
    fn used_requires_a_use() {
        let mut m = Module::new("m");
        m.add_function(Function::declaration(
            "_Z3cosf",
            Type::Float,
            vec![Param::new("x", Type::Float)],
        ))
        .unwrap();
        assert!(used_in(&m).is_empty());
    }
}
