use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use formstate::{
    FieldRules, Form, FormValidationSchema, Formstate, ScopeRules, Validation,
    drive_form_submission,
};
use serde_json::{Value, json};
use tokio::runtime::Runtime;

// --- Fixtures ---

fn contacts_model(len: usize) -> Value {
    let contacts: Vec<Value> = (0..len)
        .map(|i| json!({"name": format!("contact {i}"), "email": format!("c{i}@example.com")}))
        .collect();
    json!({ "contacts": contacts })
}

fn contacts_schema() -> FormValidationSchema {
    let contact = FormValidationSchema::new()
        .field("name", FieldRules::new().required())
        .field(
            "email",
            FieldRules::new().required().validate(|value, _, _, _| {
                Ok(match value.as_str() {
                    Some(email) if email.contains('@') => Validation::Valid,
                    _ => Validation::invalid("Not an email address."),
                })
            }),
        );
    FormValidationSchema::new().scope("contacts", ScopeRules::new().schema_for_each(contact))
}

// --- Benchmark Functions ---

fn benchmark_initialize(c: &mut Criterion) {
    let model = contacts_model(100);
    let schema = contacts_schema();
    c.bench_function("initialize_100_contacts", |b| {
        b.iter(|| Formstate::initialize(black_box(model.clone()), &schema).unwrap())
    });
}

fn benchmark_validate_form(c: &mut Criterion) {
    let formstate = Formstate::initialize(contacts_model(100), &contacts_schema()).unwrap();
    let form = Form::new(formstate.clone());
    c.bench_function("syncly_validate_form_100_contacts", |b| {
        b.iter(|| black_box(&formstate).syncly_validate_form(&form).unwrap())
    });
}

fn benchmark_change_and_validate(c: &mut Criterion) {
    let formstate = Formstate::initialize(contacts_model(100), &contacts_schema()).unwrap();
    let form = Form::new(formstate.clone());
    c.bench_function("change_and_validate_single_field", |b| {
        b.iter(|| {
            formstate
                .change_and_validate("contacts.50.email", json!("new@example.com"), &form)
                .unwrap()
        })
    });
}

fn benchmark_delete_model_key(c: &mut Criterion) {
    let formstate = Formstate::initialize(contacts_model(100), &contacts_schema()).unwrap();
    c.bench_function("delete_first_of_100_contacts", |b| {
        b.iter(|| formstate.delete_model_key(black_box("contacts.0")).unwrap())
    });
}

fn benchmark_submission(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let formstate = Formstate::initialize(contacts_model(100), &contacts_schema()).unwrap();

    c.bench_function("drive_form_submission_100_contacts", |b| {
        b.to_async(&rt).iter(|| async {
            let form = Form::new(formstate.clone());
            drive_form_submission(&form, |model, _form| async move { model })
                .await
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    benchmark_initialize,
    benchmark_validate_form,
    benchmark_change_and_validate,
    benchmark_delete_model_key,
    benchmark_submission
);
criterion_main!(benches);
