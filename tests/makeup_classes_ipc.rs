mod common;

use common::{count, error_code, open_db, staff, student, temp_dir, Sidecar};
use serde_json::json;

#[test]
fn created_class_has_code_and_active_status() {
    let root = temp_dir("makeup-create");
    let mut sc = Sidecar::spawn(&root);
    sc.select_workspace(&root.join("ws"));

    let resp = sc.call(
        "faculty.createClass",
        json!({
            "subject": "Data Structures",
            "classroom": "Lab 3",
            "date": "2099-01-01",
            "time": "14:30",
        }),
        Some(staff()),
    );
    assert_eq!(resp["ok"], true, "{}", resp);
    assert_eq!(resp["status"], 201);
    let code = resp["result"]["remedialCode"].as_str().expect("code");
    assert_eq!(code.len(), 8);
    assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    assert_eq!(resp["result"]["status"], "Active");

    let listed = sc.call_ok("faculty.classes", json!({}), Some(staff()));
    let classes = listed["classes"].as_array().expect("classes");
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0]["code"], code);
    assert_eq!(classes[0]["students"], 0);
    assert_eq!(classes[0]["description"], "");
}

#[test]
fn past_class_is_expired_and_codes_are_unique() {
    let root = temp_dir("makeup-codes");
    let mut sc = Sidecar::spawn(&root);
    sc.select_workspace(&root.join("ws"));

    let past = sc.create_class("Statistics", "2020-05-05");
    assert_eq!(past["status"], "Expired");

    let mut codes = std::collections::HashSet::new();
    codes.insert(past["remedialCode"].as_str().expect("code").to_string());
    for i in 0..20 {
        let c = sc.create_class(&format!("Subject {}", i), "2099-01-01");
        assert!(codes.insert(c["remedialCode"].as_str().expect("code").to_string()));
    }
}

#[test]
fn create_validates_fields_and_supplied_codes() {
    let root = temp_dir("makeup-create-invalid");
    let mut sc = Sidecar::spawn(&root);
    sc.select_workspace(&root.join("ws"));

    let missing = sc.call(
        "faculty.createClass",
        json!({ "subject": "Algebra", "date": "2099-01-01", "time": "10:00" }),
        Some(staff()),
    );
    assert_eq!(error_code(&missing), "bad_params");

    let bad_time = sc.call(
        "faculty.createClass",
        json!({ "subject": "Algebra", "classroom": "1", "date": "2099-01-01", "time": "25:00" }),
        Some(staff()),
    );
    assert_eq!(error_code(&bad_time), "bad_params");

    let chosen = sc.call_ok(
        "faculty.createClass",
        json!({
            "subject": "Algebra", "classroom": "1", "date": "2099-01-01", "time": "10:00",
            "remedialCode": "alg-101"
        }),
        Some(staff()),
    );
    assert_eq!(chosen["remedialCode"], "ALG-101");

    let clash = sc.call(
        "faculty.createClass",
        json!({
            "subject": "Algebra II", "classroom": "1", "date": "2099-01-02", "time": "10:00",
            "remedialCode": "ALG-101"
        }),
        Some(staff()),
    );
    assert_eq!(error_code(&clash), "code_taken");
    assert_eq!(clash["error"]["status"], 409);
}

#[test]
fn faculty_operations_require_staff() {
    let root = temp_dir("makeup-staff-gate");
    let mut sc = Sidecar::spawn(&root);
    sc.select_workspace(&root.join("ws"));

    let params = json!({ "subject": "X", "classroom": "1", "date": "2099-01-01", "time": "10:00" });
    let anon = sc.call("faculty.createClass", params.clone(), None);
    assert_eq!(error_code(&anon), "unauthorized");

    let as_student = sc.call("faculty.createClass", params, Some(student("21CS010")));
    assert_eq!(error_code(&as_student), "forbidden");
    assert_eq!(as_student["error"]["status"], 403);

    for method in ["faculty.classes", "dashboard.get", "ai.analytics", "students.list"] {
        let resp = sc.call(method, json!({}), Some(student("21CS010")));
        assert_eq!(error_code(&resp), "forbidden", "{}", method);
    }
}

#[test]
fn edit_and_status_lookup() {
    let root = temp_dir("makeup-edit");
    let mut sc = Sidecar::spawn(&root);
    sc.select_workspace(&root.join("ws"));

    let created = sc.create_class("Optics", "2099-01-01");
    let class_id = created["classId"].clone();
    let code = created["remedialCode"].as_str().expect("code").to_string();

    let edited = sc.call_ok(
        "faculty.editClass",
        json!({ "classId": class_id, "patch": { "date": "2020-01-01", "classroom": "C-1" } }),
        Some(staff()),
    );
    assert_eq!(edited["class"]["classroom"], "C-1");
    assert_eq!(edited["class"]["status"], "Expired");
    assert_eq!(edited["class"]["code"], code.as_str());

    let status = sc.call_ok(
        "classes.status",
        json!({ "remedialCode": code.to_lowercase() }),
        Some(student("21CS011")),
    );
    assert_eq!(status["status"], "Expired");
    assert_eq!(status["subject"], "Optics");

    let unknown = sc.call(
        "faculty.editClass",
        json!({ "classId": 9999, "patch": { "subject": "Nope" } }),
        Some(staff()),
    );
    assert_eq!(error_code(&unknown), "not_found");
    assert_eq!(unknown["error"]["status"], 404);

    let no_code = sc.call(
        "classes.status",
        json!({ "remedialCode": "ZZZZZZZZ" }),
        Some(student("21CS011")),
    );
    assert_eq!(no_code["error"]["status"], 404);
}

#[test]
fn deleting_a_class_removes_its_attendance() {
    let root = temp_dir("makeup-delete");
    let workspace = root.join("ws");
    let mut sc = Sidecar::spawn(&root);
    sc.select_workspace(&workspace);

    let doomed = sc.create_class("Thermodynamics", "2099-01-01");
    let kept = sc.create_class("Mechanics", "2099-01-01");
    for roll in ["21CS020", "21CS021"] {
        sc.call_ok(
            "student.markAttendance",
            json!({ "remedialCode": doomed["remedialCode"] }),
            Some(student(roll)),
        );
    }
    sc.call_ok(
        "student.markAttendance",
        json!({ "remedialCode": kept["remedialCode"] }),
        Some(student("21CS020")),
    );

    let deleted = sc.call_ok(
        "faculty.deleteClass",
        json!({ "classId": doomed["classId"] }),
        Some(staff()),
    );
    assert_eq!(deleted["deleted"], true);
    assert_eq!(deleted["attendanceRemoved"], 2);

    let conn = open_db(&workspace);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM makeup_classes"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM attendance"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM students"), 2);

    let again = sc.call(
        "faculty.deleteClass",
        json!({ "classId": doomed["classId"] }),
        Some(staff()),
    );
    assert_eq!(error_code(&again), "not_found");
}
