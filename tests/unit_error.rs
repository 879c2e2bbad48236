/// Unit tests for DiError and DiResult types

use lazy_locator::{DiError, DiResult};
use std::error::Error;

#[test]
fn test_error_display_naming_conflict() {
    let error = DiError::NamingConflict("Mailer\\Transport".to_string());
    let display_str = format!("{}", error);
    assert_eq!(
        display_str,
        "Naming conflict: a service named \"Mailer\\Transport\" is already registered"
    );
}

#[test]
fn test_error_display_not_found() {
    let error = DiError::ServiceNotFound("TestService".to_string());
    let display_str = format!("{}", error);
    assert_eq!(display_str, "Service not found: TestService");

    assert!(display_str.contains("TestService"));
    assert!(error.is_not_found());
}

#[test]
fn test_error_display_not_created_keeps_the_cause() {
    let cause = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
    let error = DiError::not_created("database", cause);
    assert_eq!(format!("{}", error), "Service not created: database: connection refused");

    let source = error.source().expect("cause should be preserved");
    assert_eq!(source.to_string(), "connection refused");
    assert!(source.downcast_ref::<std::io::Error>().is_some());
    assert!(!error.is_not_found());
}

#[test]
fn test_error_display_circular() {
    let path = vec!["ServiceA".to_string(), "ServiceB".to_string(), "ServiceA".to_string()];
    let error = DiError::CircularDependency(path);
    assert_eq!(format!("{}", error), "Circular dependency: ServiceA -> ServiceB -> ServiceA");
}

#[test]
fn test_error_display_empty_circular_path() {
    let error = DiError::CircularDependency(vec![]);
    assert_eq!(format!("{}", error), "Circular dependency: ");
}

#[test]
fn test_error_display_type_resolution() {
    let error = DiError::TypeResolution {
        type_name: "App\\Mailer".to_string(),
        reason: "type does not exist".to_string(),
    };
    assert_eq!(
        format!("{}", error),
        "Type resolution failed for App\\Mailer: type does not exist"
    );
}

#[test]
fn test_error_display_invalid_binding() {
    let error = DiError::InvalidBinding {
        name: "cache".to_string(),
        reason: "alias points to itself".to_string(),
    };
    assert_eq!(
        format!("{}", error),
        "Invalid binding for \"cache\": alias points to itself"
    );
}

#[test]
fn test_error_display_type_mismatch() {
    let error = DiError::TypeMismatch("std::string::String".to_string());
    assert_eq!(format!("{}", error), "Type mismatch for: std::string::String");
}

#[test]
fn test_error_display_proxy_errors() {
    let unknown = DiError::UnknownMember {
        type_name: "Mailer".to_string(),
        member: "reset".to_string(),
    };
    assert_eq!(format!("{}", unknown), "Unknown member reset on Mailer");

    let failed = DiError::Invocation {
        member: "send".to_string(),
        reason: "takes at least 1 argument(s), 0 given".to_string(),
    };
    assert_eq!(
        format!("{}", failed),
        "Invocation of send failed: takes at least 1 argument(s), 0 given"
    );
}

#[test]
fn test_error_display_cache_and_config() {
    assert_eq!(
        format!("{}", DiError::Cache("disk full".to_string())),
        "Cache error: disk full"
    );
    assert_eq!(
        format!("{}", DiError::Config("unknown proxy cache backend \"redis\"".to_string())),
        "Configuration error: unknown proxy cache backend \"redis\""
    );
}

#[test]
fn test_diresult_err() {
    let result: DiResult<String> = Err(DiError::ServiceNotFound("TestService".to_string()));

    match result {
        Err(DiError::ServiceNotFound(name)) => assert_eq!(name, "TestService"),
        _ => panic!("Expected ServiceNotFound error"),
    }
}

#[test]
fn test_error_debug_format() {
    let error = DiError::ServiceNotFound("TestService".to_string());
    let debug_str = format!("{:?}", error);

    assert!(debug_str.contains("ServiceNotFound"));
    assert!(debug_str.contains("TestService"));
}

#[test]
fn test_error_as_std_error() {
    let error = DiError::ServiceNotFound("TestService".to_string());

    let _: &dyn std::error::Error = &error;
    assert!(error.source().is_none());
}

#[test]
fn test_errors_cross_threads() {
    fn assert_send_sync<T: Send + Sync + 'static>() {}
    assert_send_sync::<DiError>();

    let error = std::thread::spawn(|| DiError::not_created("worker", "boom"))
        .join()
        .unwrap();
    assert_eq!(error.to_string(), "Service not created: worker: boom");
}
