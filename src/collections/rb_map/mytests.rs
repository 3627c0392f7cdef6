use crate::collections::rb_map::*;
use crate::collections::ContainerError;

use rand::{rngs::StdRng, Rng, SeedableRng};

const REP: usize = if cfg!(miri) { 2 } else { 100 };
const N: usize = if cfg!(miri) { 100 } else { 100000 };

struct BadClone {
    x: usize,
}
impl Clone for BadClone {
    fn clone(&self) -> Self {
        if self.x == 50 {
            panic!();
        }
        Self { x: self.x }
    }
}

fn pairs<K: Copy, V: Copy, C>(map: &RbMap<K, V, C>) -> Vec<(K, V)> {
    map.iter().map(|(k, v)| (*k, *v)).collect()
}

fn example() -> RbMap<i32, i32> {
    let mut map = RbMap::new();
    for k in [5, 3, 8, 1, 4, 7, 9] {
        assert!(map.insert(k, k * 10).1);
    }
    map.check();
    map
}

#[test]
fn exp_example_test() {
    let mut map = example();
    assert_eq!(
        pairs(&map),
        [(1, 10), (3, 30), (4, 40), (5, 50), (7, 70), (8, 80), (9, 90)]
    );
    let pos = map.find(&5);
    assert_eq!(map.erase(pos), Ok((5, 50)));
    map.check();
    assert_eq!(
        pairs(&map),
        [(1, 10), (3, 30), (4, 40), (7, 70), (8, 80), (9, 90)]
    );
    assert_eq!(map.len(), 6);
    assert_eq!(map.at(&5), Err(ContainerError::KeyNotFound));
    assert_eq!(map.find(&5), map.end());
    assert_eq!(map.count(&5), 0);
    assert_eq!(map.count(&4), 1);
}

#[test]
fn exp_bad_clone_test() {
    let mut map = RbMap::new();
    for i in 0..100 {
        map.insert(i, BadClone { x: i });
    }
    let r = std::panic::catch_unwind(|| {
        let _ = map.clone();
    });
    assert!(r.is_err());
    assert_eq!(map.len(), 100);
    map.check();
}

#[test]
fn std_bad_clone_test() {
    let mut map = std::collections::BTreeMap::new();
    for i in 0..100 {
        map.insert(i, BadClone { x: i });
    }
    let _ = std::panic::catch_unwind(|| {
        let _ = map.clone();
    });
}

#[test]
fn exp_clear_test() {
    let n = N;
    let mut map = RbMap::new();
    for i in 0..n {
        map.insert(i as u32, 1u8);
    }
    let pos = map.find(&7);
    let end = map.end();
    map.clear();
    assert!(map.len() == 0);
    assert!(map.is_empty());
    assert_eq!(map.begin(), map.end());
    assert_eq!(map.get_at(pos), Err(ContainerError::InvalidPosition));
    assert_eq!(map.end(), end);
    map.check();

    // Slots are reused, old positions must still be rejected.
    for i in 0..10 {
        map.insert(i as u32, 2u8);
    }
    assert_eq!(map.get_at(pos), Err(ContainerError::InvalidPosition));
    assert_eq!(map.erase(pos), Err(ContainerError::InvalidPosition));
    assert_eq!(map.len(), 10);
    map.check();
}

#[test]
#[cfg(feature = "serde")]
fn exp_serde_test() {
    let n = N;
    let mut map = RbMap::new();
    for i in 0..n {
        map.insert(i as u32, 1u8);
    }
    for _i in 0..REP {
        let ser = bincode::serialize(&map).unwrap();
        let de: RbMap<u32, u8> = bincode::deserialize(&ser).unwrap();
        assert!(de == map);
        de.check();
    }
}

#[test]
#[cfg(feature = "serde")]
fn exp_serde_unordered_test() {
    let src: std::collections::HashMap<u32, u32> = (0..1000).map(|i| (i, i * 2)).collect();
    let ser = bincode::serialize(&src).unwrap();
    let de: RbMap<u32, u32> = bincode::deserialize(&ser).unwrap();
    de.check();
    assert_eq!(de.len(), 1000);
    assert!(de.iter().all(|(k, v)| *v == k * 2));
}

#[test]
fn exp_mem_test() {
    let n = N * 10;
    let mut map = RbMap::new();
    for i in 0..n {
        map.insert(i as u32, 1u8);
    }
    println!("Done insertions");
    print_memory();
    println!("Required memory: {} bytes", n * 5);
}

#[test]
fn std_mem_test() {
    let n = N * 10;
    let mut map = std::collections::BTreeMap::new();
    for i in 0..n {
        map.insert(i as u32, 1u8);
    }
    print_memory();
    println!("Required memory: {} bytes", n * 5);
}

#[test]
fn exp_get_test() {
    let mut m = RbMap::new();
    let n = N;
    for i in 0..n {
        let v = i;
        m.insert(i, v);
    }
    assert!(m.len() == n);
    m.check();
    print_memory();
    for _rep in 0..REP {
        for i in 0..n {
            let v = i;
            assert!(m[&i] == v);
        }
    }
}

#[test]
fn std_get_test() {
    let mut m = std::collections::BTreeMap::new();
    let n = N;
    for i in 0..n {
        let v = i;
        m.insert(i, v);
    }
    assert!(m.len() == n);
    print_memory();
    for _rep in 0..REP {
        for i in 0..n {
            let v = i;
            assert!(m[&i] == v);
        }
    }
}

#[test]
fn exp_clone_test() {
    let mut m = RbMap::<usize, usize>::new();
    let n = N;
    for i in 0..n {
        m.insert(i, i);
    }
    assert!(m.len() == n);
    print_memory();

    for _rep in 0..REP {
        let cm = m.clone();
        assert!(cm.len() == n);
    }
    let cm = m.clone();
    cm.check();
    assert!(cm == m);
}

#[test]
fn std_clone_test() {
    let mut m = std::collections::BTreeMap::<usize, usize>::new();
    let n = N;
    for i in 0..n {
        m.insert(i, i);
    }
    assert!(m.len() == n);
    print_memory();

    for _rep in 0..REP {
        let cm = m.clone();
        assert!(cm.len() == n);
    }
}

#[test]
fn exp_clone_independent_test() {
    let mut m = example();
    let mut c = m.clone();
    c.check();
    assert_eq!(pairs(&c), pairs(&m));

    *c.at_mut(&3).unwrap() = 333;
    c.insert(6, 60);
    c.remove(&9);
    c.check();
    assert_eq!(m[&3], 30);
    assert!(!m.contains_key(&6));
    assert!(m.contains_key(&9));

    // Positions are tied to the map they came from.
    let pos = m.find(&4);
    assert_eq!(c.get_at(pos), Err(ContainerError::InvalidPosition));
    assert_eq!(c.erase(pos), Err(ContainerError::InvalidPosition));
    assert_eq!(c.erase(m.end()), Err(ContainerError::InvalidPosition));
    assert_eq!(m.get_at(pos), Ok((&4, &40)));
    m.erase(pos).unwrap();
    assert!(c.contains_key(&4));
}

#[test]
fn exp_clone_from_test() {
    let src = example();
    let mut dst = RbMap::new();
    dst.insert(100, 1);
    let old = dst.find(&100);
    let old_end = dst.end();
    dst.clone_from(&src);
    dst.check();
    assert_eq!(pairs(&dst), pairs(&src));
    assert_eq!(dst.get_at(old), Err(ContainerError::InvalidPosition));
    assert_eq!(dst.next(old_end), Err(ContainerError::InvalidPosition));
    assert_ne!(dst.end(), src.end());
}

#[test]
fn exp_duplicate_insert_test() {
    let mut map = example();
    let pos = map.find(&8);
    let (p, inserted) = map.insert(8, 0);
    assert!(!inserted);
    assert_eq!(p, pos);
    assert_eq!(map.len(), 7);
    assert_eq!(map[&8], 80);
    map.check();
}

#[test]
fn exp_get_or_insert_default_test() {
    let mut map: RbMap<&str, usize> = RbMap::new();
    for w in "the cat sat on the mat the end".split(' ') {
        *map.get_or_insert_default(w) += 1;
    }
    assert_eq!(map[&"the"], 3);
    assert_eq!(map.len(), 6);
    assert_eq!(*map.get_or_insert_with("dog", || 7), 7);
    assert_eq!(*map.get_or_insert_with("dog", || 8), 7);
    map.check();
}

#[test]
fn exp_position_navigation_test() {
    let mut map = example();
    let mut p = map.begin();
    let mut keys = Vec::new();
    while p != map.end() {
        keys.push(*map.get_at(p).unwrap().0);
        p = map.next(p).unwrap();
    }
    assert_eq!(keys, [1, 3, 4, 5, 7, 8, 9]);
    assert!(p.is_end());
    assert_eq!(map.next(p), Err(ContainerError::InvalidPosition));
    assert_eq!(map.get_at(p), Err(ContainerError::InvalidPosition));

    let mut back = Vec::new();
    let mut p = map.end();
    while p != map.begin() {
        p = map.prev(p).unwrap();
        back.push(*map.get_at(p).unwrap().0);
    }
    back.reverse();
    assert_eq!(back, keys);
    assert_eq!(map.prev(map.begin()), Err(ContainerError::InvalidPosition));

    let p = map.find(&7);
    *map.get_at_mut(p).unwrap().1 += 1;
    assert_eq!(map[&7], 71);

    let empty: RbMap<i32, i32> = RbMap::new();
    assert_eq!(empty.begin(), empty.end());
    assert_eq!(empty.prev(empty.end()), Err(ContainerError::InvalidPosition));
}

#[test]
fn exp_erase_invalid_test() {
    let mut map = example();
    assert_eq!(map.erase(map.end()), Err(ContainerError::InvalidPosition));
    let pos = map.find(&3);
    assert_eq!(map.erase(pos), Ok((3, 30)));
    // Erasing again through the stale position fails and changes nothing.
    assert_eq!(map.erase(pos), Err(ContainerError::InvalidPosition));
    assert_eq!(map.next(pos), Err(ContainerError::InvalidPosition));
    assert_eq!(map.len(), 6);
    assert_eq!(map.find(&3), map.end());
    map.check();
}

#[test]
fn exp_position_stability_test() {
    // Removing a node with two children moves its successor in the tree, but
    // positions to the successor (and everything else) keep their entries.
    let mut rng = StdRng::seed_from_u64(7);
    for _rep in 0..REP {
        let mut map = RbMap::new();
        for _ in 0..200 {
            let k: u32 = rng.gen_range(0..1000);
            map.insert(k, k + 1);
        }
        let all: Vec<(u32, Position)> = map.keys().map(|k| (*k, map.find(k))).collect();
        let victim = all[rng.gen_range(0..all.len())];
        map.erase(victim.1).unwrap();
        map.check();
        for (k, p) in &all {
            if *k == victim.0 {
                assert_eq!(map.get_at(*p), Err(ContainerError::InvalidPosition));
            } else {
                assert_eq!(map.get_at(*p), Ok((k, &(k + 1))));
            }
        }
    }
}

#[test]
fn exp_two_children_successor_test() {
    let mut map = example();
    // 5 is the root with two children, 7 its successor.
    let succ = map.find(&7);
    let after = map.next(succ).unwrap();
    map.erase(map.find(&5)).unwrap();
    map.check();
    assert_eq!(map.get_at(succ), Ok((&7, &70)));
    assert_eq!(map.next(succ), Ok(after));
    assert_eq!(map.get_at(map.prev(succ).unwrap()), Ok((&4, &40)));
}

#[test]
fn exp_random_test() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut exp = RbMap::new();
    let mut std = std::collections::BTreeMap::new();
    for i in 0..20000 {
        let k: u16 = rng.gen_range(0..2000);
        if rng.gen_bool(0.55) {
            let inserted = exp.insert(k, i).1;
            assert_eq!(inserted, !std.contains_key(&k));
            std.entry(k).or_insert(i);
        } else {
            let pos = exp.find(&k);
            match std.remove(&k) {
                Some(v) => assert_eq!(exp.erase(pos), Ok((k, v))),
                None => assert!(pos.is_end()),
            }
        }
        if i % 500 == 0 {
            exp.check();
        }
        assert_eq!(exp.len(), std.len());
    }
    exp.check();
    assert!(exp.iter().eq(std.iter()));
    assert!(exp.iter().rev().eq(std.iter().rev()));
    assert_eq!(exp.first_key_value(), std.first_key_value());
    assert_eq!(exp.last_key_value(), std.last_key_value());
}

#[test]
fn exp_random_walk_test() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut map = RbMap::new();
    for _ in 0..20000 {
        *map.get_or_insert_default(rng.gen_range(0..20000u32)) = rng.gen::<u32>();
        let pos = map.find(&rng.gen_range(0..20000u32));
        if !pos.is_end() {
            map.erase(pos).unwrap();
        }
    }
    map.check();
    let mut steps = 0;
    let mut p = map.begin();
    while !p.is_end() {
        p = map.next(p).unwrap();
        steps += 1;
    }
    assert_eq!(steps, map.len());

    let mut p = map.begin();
    for _ in 0..100000 {
        p = if p == map.end() {
            map.prev(p).unwrap()
        } else if p == map.begin() || rng.gen_bool(0.5) {
            map.next(p).unwrap()
        } else {
            map.prev(p).unwrap()
        };
    }
}

#[test]
fn exp_descending_insert_remove_test() {
    let mut map = RbMap::new();
    for i in (0..5000).rev() {
        map.insert(i, ());
    }
    map.check();
    for i in (0..5000).step_by(3) {
        assert_eq!(map.remove(&i), Some(()));
    }
    map.check();
    while let Some((k, _)) = map.pop_last() {
        if k % 97 == 0 {
            map.check();
        }
    }
    assert!(map.is_empty());
    map.check();
}

#[test]
fn exp_compare_test() {
    let mut map = RbMap::with_compare(ReverseOrder);
    for k in [5, 3, 8, 1] {
        map.insert(k, ());
    }
    map.check();
    assert_eq!(map.keys().copied().collect::<Vec<_>>(), [8, 5, 3, 1]);

    let mut map = RbMap::with_compare(|a: &String, b: &String| a.len() < b.len());
    map.insert("ccc".to_string(), 1);
    map.insert("a".to_string(), 2);
    assert!(!map.insert("xyz".to_string(), 3).1);
    map.check();
    assert_eq!(map[&"abc".to_string()], 1);
}

#[test]
fn exp_borrow_lookup_test() {
    let mut map = RbMap::new();
    map.insert("England".to_string(), "London");
    map.insert("France".to_string(), "Paris");
    assert_eq!(map.get("France"), Some(&"Paris"));
    assert_eq!(map.at("Spain"), Err(ContainerError::KeyNotFound));
    assert_eq!(map.remove("England"), Some("London"));
    assert_eq!(map.len(), 1);
}

#[test]
fn exp_bounds_and_range_test() {
    let map = example();
    assert_eq!(map.get_at(map.lower_bound(&4)), Ok((&4, &40)));
    assert_eq!(map.get_at(map.lower_bound(&6)), Ok((&7, &70)));
    assert_eq!(map.get_at(map.upper_bound(&4)), Ok((&5, &50)));
    assert!(map.upper_bound(&9).is_end());
    assert_eq!(map.lower_bound(&0), map.begin());

    fn keys<'a>(r: impl Iterator<Item = (&'a i32, &'a i32)>) -> Vec<i32> {
        r.map(|(k, _)| *k).collect()
    }
    assert_eq!(keys(map.range(3..8)), [3, 4, 5, 7]);
    assert_eq!(keys(map.range(3..=8)), [3, 4, 5, 7, 8]);
    assert_eq!(keys(map.range(..4)), [1, 3]);
    assert_eq!(keys(map.range(6..)), [7, 8, 9]);
    assert_eq!(keys(map.range(6..7)), Vec::<i32>::new());
    assert_eq!(keys(map.range(2..9).rev()), [8, 7, 5, 4, 3]);
    assert_eq!(keys(map.iter_from(map.find(&5)).unwrap()), [5, 7, 8, 9]);
    assert_eq!(keys(map.iter_from(map.end()).unwrap()), Vec::<i32>::new());

    let mut r = map.range::<i32, _>(..);
    assert_eq!(r.next(), Some((&1, &10)));
    assert_eq!(r.next_back(), Some((&9, &90)));
    assert_eq!(r.count(), 5);
}

#[test]
#[should_panic]
fn exp_bad_range_test() {
    let map = example();
    let _ = map.range(8..3);
}

#[test]
fn exp_iter_test() {
    let mut map = example();
    assert_eq!(map.iter().len(), 7);
    let mut it = map.iter();
    assert_eq!(it.next(), Some((&1, &10)));
    assert_eq!(it.next_back(), Some((&9, &90)));
    assert_eq!(it.len(), 5);

    for (k, v) in map.iter_mut() {
        *v += *k;
    }
    for v in map.values_mut().rev() {
        *v *= 2;
    }
    assert_eq!(
        map.values().copied().collect::<Vec<_>>(),
        [22, 66, 88, 110, 154, 176, 198]
    );
    assert_eq!(map.keys().rev().next(), Some(&9));

    let v: Vec<_> = map.clone().into_iter().rev().collect();
    assert_eq!(v.len(), 7);
    assert_eq!(v[0], (9, 198));
    assert_eq!(map.clone().into_keys().collect::<Vec<_>>(), [1, 3, 4, 5, 7, 8, 9]);
    assert_eq!(map.into_values().next_back(), Some(198));
}

#[test]
fn exp_retain_pop_test() {
    let mut map: RbMap<u32, u32> = (0..1000).map(|i| (i, i)).collect();
    map.retain(|k, v| {
        *v += 1;
        k % 3 != 0
    });
    map.check();
    assert_eq!(map.len(), 666);
    assert!(map.iter().all(|(k, v)| k % 3 != 0 && *v == k + 1));
    assert_eq!(map.pop_first(), Some((1, 2)));
    assert_eq!(map.pop_last(), Some((998, 999)));
    assert_eq!(map.len(), 664);
    map.check();
}

#[test]
fn exp_traits_test() {
    let a = RbMap::from([(2, 'b'), (1, 'a')]);
    let mut b = RbMap::new();
    b.extend([(1, 'a')]);
    assert!(a != b);
    b.extend(&RbMap::from([(2, 'b')]));
    assert!(a == b);
    assert_eq!(format!("{a:?}"), "{1: 'a', 2: 'b'}");
    b.insert(3, 'c');
    assert!(a < b);

    use std::collections::hash_map::RandomState;
    use std::hash::BuildHasher;
    let s = RandomState::new();
    let c: RbMap<_, _> = b.into_iter().take(2).collect();
    assert_eq!(s.hash_one(&a), s.hash_one(&c));
}

#[test]
fn exp_capacity_test() {
    let mut map = RbMap::with_capacity(100);
    assert!(map.capacity() >= 100);
    for i in 0..100 {
        map.insert(i, i);
    }
    map.reserve(50);
    assert!(map.capacity() >= 150);
    for i in 0..50 {
        map.remove(&i);
    }
    map.shrink_to_fit();
    assert!(map.capacity() >= 100);
    map.check();
}

#[test]
fn exp_error_display_test() {
    assert_eq!(ContainerError::KeyNotFound.to_string(), "no entry found for key");
    assert_eq!(ContainerError::InvalidPosition.to_string(), "invalid position");
}
