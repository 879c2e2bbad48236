#![no_main]

use libfuzzer_sys::fuzz_target;
use lazy_locator::{canonicalize, DiError, Instance, ServiceRegistry};

// Each byte pair is one operation on a registry of eight names.
fuzz_target!(|data: &[u8]| {
    let registry = ServiceRegistry::new();
    registry.set_allow_override(data.first().map_or(false, |b| b & 1 == 1));

    for op in data.chunks_exact(2) {
        let name = format!("service-{}", op[1] % 8);
        let other = format!("Service_{}", (op[1] >> 3) % 8);

        let result = match op[0] % 5 {
            0 => registry.set_service(&name, Instance::object(op[1])),
            1 => registry.set_factory(&name, |_| Ok(Instance::object(()))),
            2 => registry.set_alias(&name, &other),
            3 => registry.set_shared(&name, op[1] & 1 == 0),
            _ => registry.get(name.as_str()).map(|_| ()),
        };

        match result {
            Ok(())
            | Err(DiError::NamingConflict(_))
            | Err(DiError::ServiceNotFound(_))
            | Err(DiError::CircularDependency(_))
            | Err(DiError::InvalidBinding { .. }) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    for name in registry.registered_services() {
        assert_eq!(canonicalize(&name), name);
    }
});
