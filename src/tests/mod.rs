mod container_roundtrip;
mod map_and_pools;
