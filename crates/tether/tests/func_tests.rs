//! Host Function Bridge Tests
//!
//! Covers calls through the engine in both directions:
//! - Generic closures over `Val` slices
//! - Typed closures with derived signatures (with and without `Caller`)
//! - Traps returned by closures and raised by the engine
//! - Panics captured at the engine boundary and resumed at the call site
//! - Reentrant host -> engine -> host calls
//! - Interruption and call depth limits
//!
//! # Running Tests
//! ```bash
//! cargo test -p tether --test func_tests
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tether::{
    Caller, Config, Engine, Error, ExternRef, Func, FuncType, Store, Trap, TrapCode, Val, ValType,
};

fn store() -> Store {
    Store::new(&Engine::default())
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("<opaque>")
    }
}

// ===== Generic Closures =====

#[test]
fn test_results_match_declared_signature() {
    let store = store();
    let ty = FuncType::new([ValType::I32, ValType::I64], [ValType::F32, ValType::F64]);
    let f = Func::new(&store, ty, |_, args| {
        assert_eq!(args, &[Val::I32(1), Val::I64(2)]);
        Ok(vec![Val::from(3.0f32), Val::from(4.0f64)])
    });

    let results = f.call(&[Val::I32(1), Val::I64(2)]).unwrap();
    assert_eq!(results, vec![Val::from(3.0f32), Val::from(4.0f64)]);
}

#[test]
fn test_trap_message_is_preserved() {
    let store = store();
    let f = Func::new(&store, FuncType::new([], [ValType::I32]), |_, _| Err(Trap::new("x")));

    let trap = f.call(&[]).unwrap_err();
    assert_eq!(trap.message(), "x");
    assert_eq!(trap.code(), None);
}

#[test]
fn test_wrong_result_type_is_contract_violation() {
    let store = store();
    let f = Func::new(&store, FuncType::new([], [ValType::I32]), |_, _| {
        Ok(vec![Val::I64(1)])
    });

    let payload = panic::catch_unwind(AssertUnwindSafe(|| f.call(&[]))).unwrap_err();
    assert!(panic_text(&*payload).contains("wrong type of result"));
}

#[test]
fn test_wrong_result_count_is_contract_violation() {
    let store = store();
    let f = Func::new(&store, FuncType::new([], [ValType::I32]), |_, _| Ok(vec![]));

    let payload = panic::catch_unwind(AssertUnwindSafe(|| f.call(&[]))).unwrap_err();
    assert!(panic_text(&*payload).contains("wrong number of results"));
}

#[test]
fn test_float_bits_survive_the_bridge() {
    let store = store();
    let ty = FuncType::new([ValType::F32, ValType::F64], [ValType::F32, ValType::F64]);
    let identity = Func::new(&store, ty, |_, args| Ok(args.to_vec()));

    let nan32 = Val::F32(f32::NAN.to_bits() | 0x5);
    let neg_zero = Val::from(-0.0f64);
    let results = identity.call(&[nan32.clone(), neg_zero.clone()]).unwrap();
    assert_eq!(results, vec![nan32, neg_zero]);
}

// ===== Host Panics =====

#[derive(Debug, PartialEq)]
struct Fault(u64);

#[test]
fn test_panic_resumes_at_call_site() {
    let store = store();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let f = Func::new(&store, FuncType::new([], []), move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        panic!("x")
    });

    let payload = panic::catch_unwind(AssertUnwindSafe(|| f.call(&[]))).unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"x"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_panic_payload_is_not_wrapped() {
    let store = store();
    let f = Func::new(&store, FuncType::new([], []), |_, _| {
        panic::panic_any(Fault(0xdead_beef))
    });

    let payload = panic::catch_unwind(AssertUnwindSafe(|| f.call(&[]))).unwrap_err();
    assert_eq!(payload.downcast_ref::<Fault>(), Some(&Fault(0xdead_beef)));
}

#[test]
fn test_store_usable_after_panic() {
    let store = store();
    let boom = Func::wrap(&store, || -> i32 { panic!("boom") });
    let ok = Func::wrap(&store, || 7i32);

    assert!(panic::catch_unwind(AssertUnwindSafe(|| boom.call(&[]))).is_err());
    assert_eq!(ok.call(&[]), Ok(vec![Val::I32(7)]));
    // the failed call must not have leaked call depth
    let depth = Func::wrap(&store, |caller: Caller<'_>| caller.depth());
    assert_eq!(depth.call(&[]), Ok(vec![Val::I32(1)]));
}

#[test]
fn test_reentrant_panic_surfaces_once_at_outermost_call() {
    let store = store();
    let inner = Func::wrap(&store, |x: i32| -> i32 {
        if x > 0 {
            panic!("inner")
        }
        x
    });

    let after_inner = Arc::new(AtomicUsize::new(0));
    let flag = after_inner.clone();
    let inner_ref = ExternRef::new(inner);
    let outer = Func::wrap(&store, move |r: Option<ExternRef>| -> i32 {
        let r = r.unwrap();
        let inner = r.downcast_ref::<Func>().unwrap();
        let result = inner.call(&[Val::I32(1)]);
        flag.fetch_add(1, Ordering::SeqCst);
        result.map(|v| v[0].unwrap_i32()).unwrap_or(-1)
    });

    let payload = panic::catch_unwind(AssertUnwindSafe(|| {
        outer.call(&[Val::from(inner_ref.clone())])
    }))
    .unwrap_err();
    assert_eq!(panic_text(&*payload), "inner");
    assert_eq!(after_inner.load(Ordering::SeqCst), 0);
    assert_eq!(inner_ref.strong_count(), 1);
}

#[test]
fn test_reentrant_panic_caught_by_outer_closure() {
    let store = store();
    let inner = Func::wrap(&store, || -> i32 { panic!("inner") });
    let inner_ref = ExternRef::new(inner);

    let outer = Func::wrap(&store, |r: Option<ExternRef>| -> i32 {
        let r = r.unwrap();
        let inner = r.downcast_ref::<Func>().unwrap().clone();
        match panic::catch_unwind(AssertUnwindSafe(|| inner.call(&[]))) {
            Ok(_) => 0,
            Err(_) => 42,
        }
    });

    assert_eq!(outer.call(&[Val::from(inner_ref)]), Ok(vec![Val::I32(42)]));
}

// ===== Typed Closures =====

#[test]
fn test_typed_arities_receive_arguments_in_order() {
    let store = store();

    let zero = Func::wrap(&store, || 5i64);
    assert_eq!(zero.ty(), &FuncType::new([], [ValType::I64]));
    assert_eq!(zero.call(&[]), Ok(vec![Val::I64(5)]));

    let one = Func::wrap(&store, |a: f32| a * 2.0);
    assert_eq!(one.call(&[Val::from(1.5f32)]), Ok(vec![Val::from(3.0f32)]));

    let two = Func::wrap(&store, |a: i32, b: f64| (b, a));
    assert_eq!(
        two.call(&[Val::I32(9), Val::from(0.25f64)]),
        Ok(vec![Val::from(0.25f64), Val::I32(9)])
    );

    let four = Func::wrap(&store, |a: i32, b: i64, c: f32, d: f64| {
        (d, c, b, a)
    });
    assert_eq!(
        four.ty(),
        &FuncType::new(
            [ValType::I32, ValType::I64, ValType::F32, ValType::F64],
            [ValType::F64, ValType::F32, ValType::I64, ValType::I32]
        )
    );
    let typed = four.typed::<(i32, i64, f32, f64), (f64, f32, i64, i32)>().unwrap();
    assert_eq!(typed.call((1, -2, 3.5, -4.25)), Ok((-4.25, 3.5, -2, 1)));
}

#[test]
fn test_twelve_parameters() {
    let store = store();
    let sum = Func::wrap(
        &store,
        |a: i32, b: i32, c: i32, d: i32, e: i32, f: i32, g: i32, h: i32, i: i32, j: i32, k: i32, l: i32| {
            a + b + c + d + e + f + g + h + i + j + k + l
        },
    );
    assert_eq!(sum.param_arity(), 12);
    let args: Vec<Val> = (1..=12).map(Val::I32).collect();
    assert_eq!(sum.call(&args), Ok(vec![Val::I32(78)]));
}

#[test]
fn test_caller_is_not_part_of_signature() {
    let store = store();
    let f = Func::wrap(&store, |caller: Caller<'_>, x: u32| -> u32 {
        x + caller.depth()
    });

    assert_eq!(f.ty(), &FuncType::new([ValType::I32], [ValType::I32]));
    assert_eq!(f.typed::<u32, u32>().unwrap().call(10), Ok(11));
}

#[test]
fn test_trailing_result_maps_to_trap() {
    let store = store();
    let div = Func::wrap(&store, |a: i32, b: i32| -> Result<i32, Trap> {
        if b == 0 {
            return Err(Trap::new("division by zero"));
        }
        Ok(a / b)
    });
    assert_eq!(div.ty(), &FuncType::new([ValType::I32, ValType::I32], [ValType::I32]));

    let div = div.typed::<(i32, i32), i32>().unwrap();
    assert_eq!(div.call((7, 2)), Ok(3));
    assert_eq!(div.call((1, 0)).unwrap_err().message(), "division by zero");
}

#[test]
fn test_unit_result_with_trap() {
    let store = store();
    let check = Func::wrap(&store, |x: i64| -> Result<(), Trap> {
        if x < 0 {
            Err(Trap::new("negative"))
        } else {
            Ok(())
        }
    });
    assert!(check.ty().results().is_empty());
    assert_eq!(check.call(&[Val::I64(1)]), Ok(vec![]));
    assert!(check.call(&[Val::I64(-1)]).is_err());
}

#[test]
fn test_externref_passes_through() {
    let store = store();
    let identity = Func::wrap(&store, |r: Option<ExternRef>| r);
    let typed = identity
        .typed::<Option<ExternRef>, Option<ExternRef>>()
        .unwrap();

    let r = ExternRef::new(String::from("payload"));
    let back = typed.call(Some(r.clone())).unwrap().unwrap();
    assert!(ExternRef::ptr_eq(&r, &back));
    assert_eq!(back.downcast_ref::<String>().unwrap(), "payload");
    drop(back);
    assert_eq!(r.strong_count(), 1);

    assert_eq!(typed.call(None), Ok(None));
}

#[test]
fn test_typed_signature_mismatch() {
    let store = store();
    let f = Func::wrap(&store, |a: i32| a);

    match f.typed::<i64, i32>() {
        Err(Error::SignatureMismatch { expected, found }) => {
            assert_eq!(expected, FuncType::new([ValType::I64], [ValType::I32]));
            assert_eq!(&found, f.ty());
        }
        other => panic!("expected signature mismatch, got {:?}", other),
    }
    assert!(f.typed::<i32, ()>().is_err());
}

// ===== Engine Limits =====

#[test]
fn test_interrupt_traps_next_call_once() {
    let store = store();
    let f = Func::wrap(&store, || 1i32);
    let handle = store.interrupt_handle();

    let remote = handle.clone();
    std::thread::spawn(move || remote.interrupt()).join().unwrap();

    let trap = f.call(&[]).unwrap_err();
    assert_eq!(trap.code(), Some(TrapCode::Interrupt));
    assert_eq!(f.call(&[]), Ok(vec![Val::I32(1)]));
}

#[test]
fn test_interrupt_inside_host_call_is_not_swallowed() {
    let store = store();
    let inner = ExternRef::new(Func::wrap(&store, || 0i32));

    let outer = Func::wrap(&store, |caller: Caller<'_>, r: Option<ExternRef>| -> Result<i32, Trap> {
        caller.store().interrupt_handle().interrupt();
        let inner = r.unwrap();
        let results = inner.downcast_ref::<Func>().unwrap().call(&[])?;
        Ok(results[0].unwrap_i32())
    });

    let trap = outer.call(&[Val::from(inner)]).unwrap_err();
    assert_eq!(trap.message(), format!("wasm trap: {}", TrapCode::Interrupt));
}

#[test]
fn test_call_depth_limit_traps() {
    let limit = 5;
    let store = Store::new(&Engine::with_config(Config::new().max_call_depth(limit)));
    let deepest = Arc::new(AtomicU32::new(0));
    let overflowed = Arc::new(AtomicUsize::new(0));

    let seen = deepest.clone();
    let hits = overflowed.clone();
    let recurse = Func::wrap(
        &store,
        move |caller: Caller<'_>, r: Option<ExternRef>| -> Result<(), Trap> {
            seen.fetch_max(caller.depth(), Ordering::SeqCst);
            let this = r.clone().unwrap();
            let f = this.downcast_ref::<Func>().unwrap();
            match f.call(&[Val::ExternRef(r)]) {
                Err(trap) if trap.code() == Some(TrapCode::StackOverflow) => {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Err(trap)
                }
                other => other.map(|_| ()),
            }
        },
    );

    let this = ExternRef::new(recurse.clone());
    let trap = recurse.call(&[Val::from(this.clone())]).unwrap_err();
    assert_eq!(trap.message(), format!("wasm trap: {}", TrapCode::StackOverflow));
    assert_eq!(deepest.load(Ordering::SeqCst), limit);
    assert_eq!(overflowed.load(Ordering::SeqCst), 1);
    assert_eq!(this.strong_count(), 1);
}

// ===== Argument Checking =====

#[test]
#[should_panic(expected = "wrong type of argument")]
fn test_argument_kind_mismatch_panics() {
    let store = store();
    let f = Func::wrap(&store, |x: f64| x);
    let _ = f.call(&[Val::F32(0)]);
}

#[test]
#[should_panic(expected = "wrong number of arguments")]
fn test_argument_count_mismatch_panics() {
    let store = store();
    let f = Func::wrap(&store, |x: f64| x);
    let _ = f.call(&[]);
}
